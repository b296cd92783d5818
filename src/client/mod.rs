// src/client/mod.rs
//
// CANyonero client engine: owns one transport connection, runs the receive
// task, and exposes request/response operations on top of a PDU queue.
//
// Concurrency model: one spawned receive task pulls chunks from the
// transport, feeds the stream reassembler, and pushes every PDU onto a
// single unbounded queue in parse order. Callers block (bounded by their
// own timeout) on that queue via `wait_for`. One in-flight operation per
// logical exchange; a non-matching PDU observed by a waiter is discarded,
// not requeued.

pub mod channels;

pub use channels::{Channel, ChannelTable};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::rpc::{self, RpcCall};
use crate::protocol::stream::PduStream;
use crate::protocol::{
    separation_time_code_from_microseconds, Arbitration, ChannelProtocol, DeviceInfo, Pdu,
    PduType, MAX_PDU_PAYLOAD, MAX_PDU_SIZE,
};
use crate::transport::{tcp, Endpoint, Transport, TransportKind, TransportRead, TransportWrite};

/// Default per-operation response timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// How long `connect` waits for the transport to come up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Receive task chunk size.
const READ_CHUNK: usize = 4096;
/// Read poll granularity; bounds how quickly the stop flag is observed.
const READ_POLL: Duration = Duration::from_millis(50);
/// Bounded wait for the receive task to exit during `close`.
const CLOSE_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Payload byte used for generated ping patterns.
const PING_FILL: u8 = 0xA5;

/// Reply types an RPC call can resolve to.
const RPC_OUTCOMES: &[PduType] = &[
    PduType::RpcResponse,
    PduType::ErrorInvalidRpc,
    PduType::ErrorInvalidCommand,
    PduType::ErrorHardware,
    PduType::ErrorUnspecified,
];

/// Predicate for `wait_for`, a closed set of match shapes rather than a
/// free-form closure so dispatch stays exhaustively testable.
#[derive(Clone, Copy, Debug)]
pub enum ResponseMatcher {
    /// Match exactly one reply type.
    Type(PduType),
    /// Match any of a set of reply types.
    AnyOf(&'static [PduType]),
    /// Match `Received`/`ReceivedCompressed` for a specific channel handle.
    ReceivedOn(u8),
}

impl ResponseMatcher {
    pub fn matches(&self, pdu: &Pdu) -> bool {
        match self {
            ResponseMatcher::Type(ty) => pdu.pdu_type() == *ty,
            ResponseMatcher::AnyOf(types) => types.contains(&pdu.pdu_type()),
            ResponseMatcher::ReceivedOn(handle) => {
                matches!(
                    pdu.pdu_type(),
                    PduType::Received | PduType::ReceivedCompressed
                ) && pdu.payload().first() == Some(handle)
            }
        }
    }
}

/// Parameters for opening a logical channel.
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfig {
    pub protocol: ChannelProtocol,
    pub bitrate: u32,
    /// Data-phase bitrate, required for FD protocols.
    pub data_bitrate: Option<u32>,
    /// Receive separation time in microseconds.
    pub rx_separation_us: u16,
    /// Transmit separation time in microseconds.
    pub tx_separation_us: u16,
}

impl ChannelConfig {
    pub fn new(protocol: ChannelProtocol, bitrate: u32) -> Self {
        ChannelConfig {
            protocol,
            bitrate,
            data_bitrate: None,
            rx_separation_us: 0,
            tx_separation_us: 0,
        }
    }

    pub fn with_data_bitrate(mut self, data_bitrate: u32) -> Self {
        self.data_bitrate = Some(data_bitrate);
        self
    }

    pub fn with_separation_us(mut self, rx: u16, tx: u16) -> Self {
        self.rx_separation_us = rx;
        self.tx_separation_us = tx;
        self
    }
}

/// State held while a connection is up.
struct Connection {
    writer: Arc<TokioMutex<Box<dyn TransportWrite>>>,
    queue: TokioMutex<mpsc::UnboundedReceiver<Pdu>>,
    stop: Arc<AtomicBool>,
    /// Fatal condition recorded by the receive task, surfaced to callers
    /// once the queue drains.
    fatal: Arc<StdMutex<Option<Error>>>,
    reader: Option<JoinHandle<()>>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Covers clients dropped without close(): the receive task observes
        // the flag at its next poll and exits.
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Client engine for one CANyonero adapter connection.
pub struct Client {
    endpoint: Endpoint,
    max_pdu_size: usize,
    connection: Option<Connection>,
    next_rpc_id: AtomicU64,
    channels: StdMutex<ChannelTable>,
}

impl Client {
    /// Create a client for the given endpoint string. No I/O happens until
    /// [`connect`](Client::connect).
    pub fn new(endpoint: &str) -> Result<Client> {
        Ok(Client {
            endpoint: Endpoint::parse(endpoint)?,
            max_pdu_size: MAX_PDU_SIZE,
            connection: None,
            next_rpc_id: AtomicU64::new(1),
            channels: StdMutex::new(ChannelTable::new()),
        })
    }

    /// Override the maximum accepted PDU size (testing and constrained
    /// deployments). Takes effect at the next connect.
    pub fn with_max_pdu_size(mut self, max_pdu_size: usize) -> Self {
        self.max_pdu_size = max_pdu_size;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Open the transport and start the receive task. No-op while already
    /// connected.
    ///
    /// Only TCP endpoints can be dialed here; BLE/L2CAP channels are
    /// platform integrations and must be attached via
    /// [`connect_with`](Client::connect_with).
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        match self.endpoint.kind {
            TransportKind::Tcp => {
                let transport = tcp::connect(&self.endpoint, CONNECT_TIMEOUT).await?;
                self.attach(transport);
                info!("connected to {}", self.endpoint);
                Ok(())
            }
            TransportKind::Ble => Err(Error::invalid_argument(
                "BLE endpoints require an externally supplied transport; use connect_with",
            )),
        }
    }

    /// Attach an already connected transport and start the receive task.
    pub fn connect_with(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        if self.connection.is_some() {
            return Err(Error::invalid_argument("already connected"));
        }
        self.attach(transport);
        Ok(())
    }

    fn attach(&mut self, transport: Box<dyn Transport>) {
        let (reader, writer) = transport.into_split();
        let stop = Arc::new(AtomicBool::new(false));
        let fatal = Arc::new(StdMutex::new(None));
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            reader,
            PduStream::new(self.max_pdu_size),
            tx,
            stop.clone(),
            fatal.clone(),
        ));

        self.connection = Some(Connection {
            writer: Arc::new(TokioMutex::new(writer)),
            queue: TokioMutex::new(rx),
            stop,
            fatal,
            reader: Some(reader),
        });
    }

    /// Stop the receive task (bounded wait), release the transport, and
    /// forget all channel state. Safe to call repeatedly.
    pub async fn close(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        connection.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = connection.reader.take() {
            // Best effort: if the task does not exit in time, the transport
            // is released anyway.
            if tokio::time::timeout(CLOSE_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("receive task did not stop within {CLOSE_JOIN_TIMEOUT:?}");
            }
        }
        if let Err(e) = connection.writer.lock().await.shutdown().await {
            debug!("transport shutdown: {e}");
        }
        self.channels.lock().unwrap().clear();
        info!("disconnected from {}", self.endpoint);
    }

    // ------------------------------------------------------------------
    // Queue access
    // ------------------------------------------------------------------

    /// Transmit one PDU.
    pub async fn send_pdu(&self, pdu: &Pdu) -> Result<()> {
        let connection = self.connection.as_ref().ok_or(Error::NotConnected)?;
        let frame = pdu.frame();
        debug!(
            "tx {:?} {} bytes: {}",
            pdu.pdu_type(),
            frame.len(),
            preview(&frame)
        );
        connection
            .writer
            .lock()
            .await
            .send(&frame)
            .await
            .map_err(|e| Error::transport(e.to_string()))
    }

    /// Pull the next PDU from the receive queue.
    ///
    /// `None` timeout waits without bound (a deliberate caller opt-in);
    /// otherwise returns `Ok(None)` once the timeout elapses. After the
    /// receive task has died and the queue drained, surfaces the recorded
    /// fatal condition.
    pub async fn get_pdu(&self, timeout: Option<Duration>) -> Result<Option<Pdu>> {
        let connection = self.connection.as_ref().ok_or(Error::NotConnected)?;
        let mut queue = connection.queue.lock().await;
        match timeout {
            None => match queue.recv().await {
                Some(pdu) => Ok(Some(pdu)),
                None => Err(self.receive_path_error(connection)),
            },
            Some(timeout) => match tokio::time::timeout(timeout, queue.recv()).await {
                Ok(Some(pdu)) => Ok(Some(pdu)),
                Ok(None) => Err(self.receive_path_error(connection)),
                Err(_) => Ok(None),
            },
        }
    }

    fn receive_path_error(&self, connection: &Connection) -> Error {
        connection
            .fatal
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Error::NotConnected)
    }

    /// Wait for the next PDU matching `matcher`, discarding non-matching
    /// PDUs, until `timeout` elapses.
    pub async fn wait_for(&self, matcher: ResponseMatcher, timeout: Duration) -> Result<Pdu> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            match self.get_pdu(Some(remaining)).await? {
                Some(pdu) if matcher.matches(&pdu) => return Ok(pdu),
                Some(pdu) => {
                    debug!("discarding unmatched {:?}", pdu.pdu_type());
                }
                None => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Request the device information record.
    pub async fn request_info(&self, timeout: Duration) -> Result<DeviceInfo> {
        self.send_pdu(&Pdu::request_info()).await?;
        let pdu = self
            .wait_for(ResponseMatcher::Type(PduType::Info), timeout)
            .await?;
        pdu.device_info()
    }

    /// Read the battery voltage in volts.
    pub async fn read_voltage(&self, timeout: Duration) -> Result<f64> {
        self.send_pdu(&Pdu::read_voltage()).await?;
        let pdu = self
            .wait_for(ResponseMatcher::Type(PduType::Voltage), timeout)
            .await?;
        Ok(pdu.voltage_millivolts()? as f64 / 1000.0)
    }

    /// Ping the adapter with `payload_size` bytes; returns the round-trip
    /// time. Payloads beyond the protocol maximum are rejected before any
    /// transmission.
    pub async fn ping(&self, payload_size: usize, timeout: Duration) -> Result<Duration> {
        if payload_size > MAX_PDU_PAYLOAD {
            return Err(Error::invalid_argument(format!(
                "ping payload of {payload_size} bytes exceeds protocol maximum of {MAX_PDU_PAYLOAD}"
            )));
        }
        let start = std::time::Instant::now();
        self.send_pdu(&Pdu::ping(vec![PING_FILL; payload_size])).await?;
        self.wait_for(ResponseMatcher::Type(PduType::Pong), timeout)
            .await?;
        Ok(start.elapsed())
    }

    /// Reboot the adapter.
    pub async fn reset(&self, timeout: Duration) -> Result<()> {
        self.send_pdu(&Pdu::reset()).await?;
        self.wait_for(ResponseMatcher::Type(PduType::Ok), timeout)
            .await?;
        Ok(())
    }

    /// Issue a JSON-RPC call and return its result object.
    ///
    /// Ids are assigned from a per-client monotonically increasing counter.
    /// An adapter error reply surfaces as [`Error::Rpc`] carrying the reply
    /// type, so callers can distinguish "unsupported, fall back" from a
    /// genuine failure.
    pub async fn rpc_call(
        &self,
        method: &str,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Map<String, Value>> {
        let id = self.next_rpc_id.fetch_add(1, Ordering::SeqCst);
        let json = RpcCall {
            method,
            id,
            params: &params,
        }
        .to_json()?;
        self.send_pdu(&Pdu::rpc_call(json)).await?;

        let pdu = self
            .wait_for(ResponseMatcher::AnyOf(RPC_OUTCOMES), timeout)
            .await?;
        if pdu.pdu_type() != PduType::RpcResponse {
            return Err(Error::Rpc {
                kind: pdu.pdu_type(),
            });
        }
        rpc::decode_response(pdu.payload(), id)
    }

    /// Open a logical channel and register it; returns the adapter-assigned
    /// handle. FD protocols require a positive data bitrate, checked before
    /// any I/O.
    pub async fn open_channel(&self, config: &ChannelConfig, timeout: Duration) -> Result<u8> {
        let rx_code = separation_time_code_from_microseconds(config.rx_separation_us);
        let tx_code = separation_time_code_from_microseconds(config.tx_separation_us);

        let request = if config.protocol.is_fd() {
            let data_bitrate = match config.data_bitrate {
                Some(rate) if rate > 0 => rate,
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "data_bitrate must be provided for {} channels",
                        config.protocol
                    )))
                }
            };
            Pdu::open_fd_channel(config.protocol, config.bitrate, data_bitrate, rx_code, tx_code)
        } else {
            Pdu::open_channel(config.protocol, config.bitrate, rx_code, tx_code)
        };
        self.send_pdu(&request).await?;

        let pdu = self
            .wait_for(ResponseMatcher::Type(PduType::ChannelOpened), timeout)
            .await?;
        let handle = pdu
            .handle()
            .map_err(|_| Error::malformed("channel opened reply missing handle"))?;
        let data_bitrate = config.protocol.is_fd().then_some(config.data_bitrate).flatten();
        self.channels
            .lock()
            .unwrap()
            .register(handle, config.protocol, config.bitrate, data_bitrate);
        info!(
            "channel {handle} opened: {} at {} bps",
            config.protocol, config.bitrate
        );
        Ok(handle)
    }

    /// Set the arbitration filter for an open channel.
    pub async fn set_arbitration(
        &self,
        handle: u8,
        arbitration: Arbitration,
        timeout: Duration,
    ) -> Result<()> {
        self.send_pdu(&Pdu::set_arbitration(handle, &arbitration))
            .await?;
        self.wait_for(ResponseMatcher::Type(PduType::Ok), timeout)
            .await?;
        self.channels.lock().unwrap().set_arbitration(handle, arbitration)
    }

    /// Send data over a channel. Fire and forget: no reply is awaited.
    pub async fn send(&self, handle: u8, data: &[u8]) -> Result<()> {
        self.send_pdu(&Pdu::send(handle, data)).await
    }

    /// Send LZ4-compressed data over a channel. Fire and forget.
    pub async fn send_compressed(&self, handle: u8, data: &[u8]) -> Result<()> {
        self.send_pdu(&Pdu::send_compressed(handle, data)).await
    }

    /// Close a channel. The wire call must succeed normally; removal from
    /// the table is idempotent either way.
    pub async fn close_channel(&self, handle: u8, timeout: Duration) -> Result<()> {
        self.send_pdu(&Pdu::close_channel(handle)).await?;
        self.wait_for(ResponseMatcher::Type(PduType::ChannelClosed), timeout)
            .await?;
        self.channels.lock().unwrap().forget(handle);
        Ok(())
    }

    /// Begin sending a periodic out-of-band message; returns its handle.
    pub async fn start_periodic_message(
        &self,
        interval: u8,
        arbitration: Arbitration,
        data: &[u8],
        timeout: Duration,
    ) -> Result<u8> {
        self.send_pdu(&Pdu::start_periodic_message(interval, &arbitration, data))
            .await?;
        let pdu = self
            .wait_for(
                ResponseMatcher::Type(PduType::PeriodicMessageStarted),
                timeout,
            )
            .await?;
        pdu.handle()
    }

    /// Stop a periodic message by handle.
    pub async fn end_periodic_message(&self, handle: u8, timeout: Duration) -> Result<()> {
        self.send_pdu(&Pdu::end_periodic_message(handle)).await?;
        self.wait_for(
            ResponseMatcher::Type(PduType::PeriodicMessageEnded),
            timeout,
        )
        .await?;
        Ok(())
    }

    /// Snapshot of the channels currently believed open.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.lock().unwrap().snapshot()
    }
}

/// Open a channel with bounded retries, reconnecting between attempts.
///
/// Retry policy lives here, on top of the engine, which always fails a
/// single attempt cleanly on timeout. Exhausting all attempts surfaces
/// [`Error::Timeout`].
pub async fn open_channel_with_retry(
    client: &mut Client,
    config: &ChannelConfig,
    open_timeout: Duration,
    retries: u32,
    retry_delay: Duration,
) -> Result<u8> {
    for attempt in 0..=retries {
        match client.open_channel(config, open_timeout).await {
            Ok(handle) => return Ok(handle),
            Err(Error::Timeout) => {
                warn!("channel open attempt {} timed out", attempt + 1);
                client.close().await;
                tokio::time::sleep(retry_delay).await;
                client.connect().await?;
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::Timeout)
}

/// Receive task: transport chunks -> reassembler -> PDU queue.
async fn read_loop(
    mut reader: Box<dyn TransportRead>,
    mut stream: PduStream,
    tx: mpsc::UnboundedSender<Pdu>,
    stop: Arc<AtomicBool>,
    fatal: Arc<StdMutex<Option<Error>>>,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    while !stop.load(Ordering::SeqCst) {
        match tokio::time::timeout(READ_POLL, reader.recv(&mut buf)).await {
            Ok(Ok(0)) => {
                info!("connection closed by peer");
                *fatal.lock().unwrap() = Some(Error::transport("connection closed by peer"));
                return;
            }
            Ok(Ok(n)) => match stream.feed(&buf[..n]) {
                Ok(pdus) => {
                    for pdu in pdus {
                        debug!(
                            "rx {:?} {} bytes: {}",
                            pdu.pdu_type(),
                            pdu.payload().len(),
                            preview(pdu.payload())
                        );
                        if tx.send(pdu).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("receive stream failed: {e}");
                    *fatal.lock().unwrap() = Some(e);
                    return;
                }
            },
            Ok(Err(e)) => {
                if !stop.load(Ordering::SeqCst) {
                    warn!("transport read failed: {e}");
                    *fatal.lock().unwrap() = Some(Error::transport(e.to_string()));
                }
                return;
            }
            // Poll timeout: re-check the stop flag.
            Err(_) => {}
        }
    }
}

/// Short hex preview for tx/rx logging.
fn preview(bytes: &[u8]) -> String {
    const PREVIEW_LEN: usize = 64;
    if bytes.len() > PREVIEW_LEN {
        format!("{}...", hex::encode(&bytes[..PREVIEW_LEN]))
    } else {
        hex::encode(bytes)
    }
}
