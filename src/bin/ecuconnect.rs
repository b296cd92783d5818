// src/bin/ecuconnect.rs
//
// Command-line tool for CANyonero adapters: device queries, JSON-RPC
// configuration, channel monitoring, and one-shot frame sends.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};

use ecuconnect::{
    open_channel_with_retry, Addressing, ChannelConfig, ChannelProtocol, Client, Error, PduType,
    ResponseMatcher, Result, DEFAULT_ENDPOINT,
};

#[derive(Debug, Parser)]
#[clap(version, about = "ECUconnect tool for CANyonero adapters")]
struct Cli {
    /// Adapter endpoint (host:port, tcp://..., l2cap://...)
    #[clap(short, long, default_value = DEFAULT_ENDPOINT, global = true)]
    endpoint: String,

    /// Response timeout in seconds
    #[clap(short, long, default_value_t = 2.0, global = true)]
    timeout: f64,

    #[clap(long, default_value_t = tracing::Level::WARN, global = true)]
    log_level: tracing::Level,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show device information and battery voltage
    Info,
    /// Measure round-trip latency
    Ping {
        /// Payload size in bytes
        #[clap(short, long, default_value_t = 8)]
        size: usize,
        /// Number of pings
        #[clap(short, long, default_value_t = 3)]
        count: u32,
    },
    /// Reboot the adapter
    Reset,
    /// Send one frame and print the replies
    Send(SendArgs),
    /// Open a channel and print received frames
    Monitor(MonitorArgs),
    /// Configure the adapter via JSON-RPC
    #[clap(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
struct ChannelArgs {
    /// Bitrate in bits/second
    #[clap(default_value_t = 500_000)]
    bitrate: u32,

    /// Channel protocol (raw, isotp, kline, raw_fd, isotp_fd)
    #[clap(short, long, default_value = "raw")]
    proto: String,

    /// CAN FD data bitrate (raw_fd/isotp_fd only)
    #[clap(long, default_value_t = 2_000_000)]
    data_bitrate: u32,

    /// Addressing (e.g. 7df,7e8 or 7df,7xx)
    #[clap(short, long, default_value = "7df,7e8")]
    addressing: String,
}

#[derive(Debug, Args)]
struct SendArgs {
    /// Hex payload, e.g. "0902" or "09 02"
    data: String,

    #[clap(flatten)]
    channel: ChannelArgs,

    /// How long to collect replies, in seconds
    #[clap(short, long, default_value_t = 1.0)]
    wait: f64,
}

#[derive(Debug, Args)]
struct MonitorArgs {
    #[clap(flatten)]
    channel: ChannelArgs,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Set the operating mode (elm327, logger, canvoy, ecos)
    Mode { mode: String },
    /// Reboot via JSON-RPC, falling back to the reset command
    Reboot,
    /// Print the adapter configuration
    Show,
    /// Get or set the CANvoy role
    Canvoy {
        /// New role (vehicle, tester, unconfigured); omit to query
        role: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ecuconnect::logging::init(cli.log_level);

    let timeout = Duration::from_secs_f64(cli.timeout);
    let mut client = Client::new(&cli.endpoint)?;
    client.connect().await?;

    let outcome = run(&mut client, &cli.command, timeout).await;
    client.close().await;
    outcome
}

async fn run(client: &mut Client, command: &Command, timeout: Duration) -> Result<()> {
    match command {
        Command::Info => {
            let info = client.request_info(timeout).await?;
            let voltage = client.read_voltage(timeout).await?;
            println!("Vendor:   {}", info.vendor);
            println!("Model:    {}", info.model);
            println!("Hardware: {}", info.hardware);
            println!("Serial:   {}", info.serial);
            println!("Firmware: {}", info.firmware);
            println!("Voltage:  {voltage:.2} V");
        }
        Command::Ping { size, count } => {
            let mut total = Duration::ZERO;
            for i in 1..=*count {
                let rtt = client.ping(*size, timeout).await?;
                total += rtt;
                println!("ping {i}/{count}: {} bytes in {:.2} ms", size, rtt.as_secs_f64() * 1000.0);
            }
            if *count > 1 {
                println!(
                    "average: {:.2} ms",
                    total.as_secs_f64() * 1000.0 / *count as f64
                );
            }
        }
        Command::Reset => {
            client.reset(timeout).await?;
            println!("Adapter reset.");
        }
        Command::Send(args) => {
            let payload = parse_hex_bytes(&args.data)?;
            let (handle, addressing) = open_channel(client, &args.channel, timeout).await?;

            client.send(handle, &payload).await?;
            println!("Sent {} bytes with {}.", payload.len(), addressing);

            collect_replies(client, handle, Duration::from_secs_f64(args.wait)).await;
            client.close_channel(handle, timeout).await?;
        }
        Command::Monitor(args) => {
            let (handle, addressing) = open_channel(client, &args.channel, timeout).await?;
            println!("Monitoring with {addressing}; ctrl-c to stop.");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    pdu = client.wait_for(
                        ResponseMatcher::ReceivedOn(handle),
                        Duration::from_millis(250),
                    ) => match pdu {
                        Ok(pdu) => print_received(&pdu),
                        Err(Error::Timeout) => {}
                        Err(e) => return Err(e),
                    },
                }
            }
            client.close_channel(handle, timeout).await?;
        }
        Command::Config(config) => run_config(client, config, timeout).await?,
    }
    Ok(())
}

async fn run_config(client: &Client, command: &ConfigCommand, timeout: Duration) -> Result<()> {
    match command {
        ConfigCommand::Mode { mode } => {
            let (mode_id, name) = parse_mode(mode)?;
            let result = client
                .rpc_call("app.set_mode", params(json!({ "mode": mode_id })), timeout)
                .await?;
            let active = result
                .get("mode")
                .and_then(Value::as_u64)
                .map(|m| format_mode(m as u8))
                .unwrap_or_else(|| name.to_string());
            println!("Operating mode set to {active}.");
        }
        ConfigCommand::Reboot => {
            // Newer firmware exposes system.reboot; older builds only know
            // the reset command.
            match client.rpc_call("system.reboot", Map::new(), timeout).await {
                Ok(_) => println!("Rebooting."),
                Err(Error::Rpc { .. }) => {
                    client.reset(timeout).await?;
                    println!("Rebooting (legacy reset).");
                }
                Err(e) => return Err(e),
            }
        }
        ConfigCommand::Show => {
            let config = client.rpc_call("app.config", Map::new(), timeout).await?;
            if config.is_empty() {
                println!("No configuration reported.");
            }
            for (key, value) in &config {
                println!("{key}: {value}");
            }
        }
        ConfigCommand::Canvoy { role: None } => {
            let result = client.rpc_call("canvoy.role", Map::new(), timeout).await?;
            let role = result
                .get("role")
                .and_then(Value::as_u64)
                .map(|r| format_role(r as u8))
                .unwrap_or_else(|| "unknown".to_string());
            println!("CANvoy role: {role}");
        }
        ConfigCommand::Canvoy { role: Some(role) } => {
            let (role_id, name) = parse_role(role)?;
            client
                .rpc_call("canvoy.set_role", params(json!({ "role": role_id })), timeout)
                .await?;
            println!("CANvoy role set to {name}.");
        }
    }
    Ok(())
}

async fn open_channel(
    client: &mut Client,
    args: &ChannelArgs,
    timeout: Duration,
) -> Result<(u8, Addressing)> {
    let protocol = ChannelProtocol::from_name(&args.proto).ok_or_else(|| {
        Error::invalid_argument(format!(
            "invalid protocol '{}'; use raw, isotp, kline, raw_fd, or isotp_fd",
            args.proto
        ))
    })?;
    let addressing = Addressing::parse(&args.addressing)?;

    let mut config = ChannelConfig::new(protocol, args.bitrate);
    if protocol.is_fd() {
        config = config.with_data_bitrate(args.data_bitrate);
    }

    let handle =
        open_channel_with_retry(client, &config, timeout, 3, Duration::from_secs(1)).await?;
    client
        .set_arbitration(handle, addressing.arbitration(), timeout)
        .await?;
    Ok((handle, addressing))
}

/// Drain received frames for `window`, printing each.
async fn collect_replies(client: &Client, handle: u8, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match client
            .wait_for(ResponseMatcher::ReceivedOn(handle), remaining)
            .await
        {
            Ok(pdu) => print_received(&pdu),
            Err(_) => return,
        }
    }
}

fn print_received(pdu: &ecuconnect::Pdu) {
    debug_assert!(matches!(
        pdu.pdu_type(),
        PduType::Received | PduType::ReceivedCompressed
    ));
    match pdu.received_frame() {
        Ok(frame) => {
            let width = if frame.id > 0x7FF { 8 } else { 3 };
            let data_hex: Vec<String> =
                frame.data.iter().map(|b| format!("{b:02X}")).collect();
            println!("{:0width$X}   {}", frame.id, data_hex.join(" "));
        }
        Err(e) => eprintln!("undecodable received frame: {e}"),
    }
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn parse_hex_bytes(data: &str) -> Result<Vec<u8>> {
    let mut cleaned: String = data
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if cleaned.len() % 2 != 0 {
        cleaned.insert(0, '0');
    }
    hex::decode(&cleaned).map_err(|_| Error::invalid_argument(format!("invalid hex payload: {data}")))
}

fn parse_mode(value: &str) -> Result<(u8, &'static str)> {
    Ok(match value.to_ascii_lowercase().as_str() {
        "0" | "elm" | "elm327" => (0, "elm327"),
        "1" | "logger" => (1, "logger"),
        "2" | "canvoy" => (2, "canvoy"),
        "3" | "ecos" => (3, "ecos"),
        _ => {
            return Err(Error::invalid_argument(
                "mode must be ecos, elm327, logger, canvoy (or 0-3)",
            ))
        }
    })
}

fn format_mode(mode: u8) -> String {
    match mode {
        0 => "elm327".to_string(),
        1 => "logger".to_string(),
        2 => "canvoy".to_string(),
        3 => "ecos".to_string(),
        other => format!("unknown({other})"),
    }
}

fn parse_role(value: &str) -> Result<(u8, &'static str)> {
    Ok(match value.to_ascii_lowercase().as_str() {
        "0" | "none" | "unconfigured" => (0, "unconfigured"),
        "1" | "vehicle" => (1, "vehicle"),
        "2" | "tester" => (2, "tester"),
        _ => {
            return Err(Error::invalid_argument(
                "role must be vehicle, tester, unconfigured (or 0-2)",
            ))
        }
    })
}

fn format_role(role: u8) -> String {
    match role {
        0 => "unconfigured".to_string(),
        1 => "vehicle".to_string(),
        2 => "tester".to_string(),
        other => format!("unknown({other})"),
    }
}
