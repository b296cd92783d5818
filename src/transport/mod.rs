// src/transport/mod.rs
//
// Transport port boundary: endpoint parsing and the byte-stream abstraction
// the client engine consumes. The engine never inspects transport-specific
// details; anything that can move bytes (TCP, an L2CAP channel supplied by a
// platform integration, an in-memory loopback in tests) plugs in here.

pub mod tcp;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::error::{Error, Result};

/// Default adapter endpoint on the ECUconnect Wi-Fi network.
pub const DEFAULT_ENDPOINT: &str = "192.168.42.42:129";

const DEFAULT_L2CAP_PSM: u16 = 129;

/// Transport flavor selected by the endpoint scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Ble,
}

/// Parsed connection target, created once at connect time and immutable for
/// the life of the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: TransportKind,
    /// Hostname/IP for TCP; L2CAP service UUID for BLE.
    pub host: String,
    /// TCP port, or L2CAP PSM.
    pub port: u16,
    /// Optional BLE peer identifier from the endpoint path.
    pub peer: Option<String>,
}

impl Endpoint {
    /// Parse an endpoint string.
    ///
    /// Accepted forms:
    ///   `host:port`
    ///   `tcp://host:port` (aliases: `ecuconnect`, `ecuconnect-wifi`)
    ///   `l2cap://SERVICE-UUID[:psm][/PEER-UUID]` (aliases: `ble`,
    ///   `ecuconnect-l2cap`; PSM defaults to 129)
    pub fn parse(value: &str) -> Result<Endpoint> {
        if let Some((scheme, rest)) = value.split_once("://") {
            let (authority, path) = match rest.split_once('/') {
                Some((authority, path)) => (authority, Some(path)),
                None => (rest, None),
            };
            return match scheme.to_ascii_lowercase().as_str() {
                "ecuconnect-l2cap" | "l2cap" | "ble" => {
                    let (host, port) = match authority.rsplit_once(':') {
                        Some((host, port_str)) => (host, parse_port(port_str, value)?),
                        None => (authority, DEFAULT_L2CAP_PSM),
                    };
                    if host.is_empty() {
                        return Err(Error::invalid_endpoint(value));
                    }
                    let peer = match path.filter(|p| !p.is_empty()) {
                        Some(p) => Some(validate_uuid(p)?),
                        None => None,
                    };
                    Ok(Endpoint {
                        kind: TransportKind::Ble,
                        host: host.to_ascii_uppercase(),
                        port,
                        peer,
                    })
                }
                "ecuconnect-wifi" | "ecuconnect" | "tcp" => {
                    let (host, port_str) = authority
                        .rsplit_once(':')
                        .ok_or_else(|| Error::invalid_endpoint(value))?;
                    if host.is_empty() {
                        return Err(Error::invalid_endpoint(value));
                    }
                    Ok(Endpoint {
                        kind: TransportKind::Tcp,
                        host: host.to_string(),
                        port: parse_port(port_str, value)?,
                        peer: None,
                    })
                }
                other => Err(Error::invalid_endpoint(format!(
                    "unsupported scheme: {other}"
                ))),
            };
        }

        match value.rsplit_once(':') {
            Some((host, port_str)) if !host.is_empty() => Ok(Endpoint {
                kind: TransportKind::Tcp,
                host: host.to_string(),
                port: parse_port(port_str, value)?,
                peer: None,
            }),
            _ => Err(Error::invalid_endpoint(value)),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self.kind {
            TransportKind::Tcp => "tcp",
            TransportKind::Ble => "l2cap",
        };
        write!(f, "{scheme}://{}:{}", self.host, self.port)?;
        if let Some(peer) = &self.peer {
            write!(f, "/{peer}")?;
        }
        Ok(())
    }
}

fn parse_port(text: &str, endpoint: &str) -> Result<u16> {
    match text.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(Error::invalid_endpoint(format!(
            "invalid port in endpoint: {endpoint}"
        ))),
    }
}

/// Validate the 8-4-4-4-12 hex form of a BLE peer UUID; returns it uppercased.
fn validate_uuid(text: &str) -> Result<String> {
    let groups: Vec<&str> = text.split('-').collect();
    let valid = groups.len() == 5
        && groups
            .iter()
            .zip([8usize, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(Error::invalid_endpoint(format!(
            "invalid BLE peer UUID in endpoint path: {text}"
        )));
    }
    Ok(text.to_ascii_uppercase())
}

/// Receiving half of a transport.
#[async_trait]
pub trait TransportRead: Send {
    /// Read the next chunk into `buf`. Returns 0 on end of stream.
    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Sending half of a transport.
#[async_trait]
pub trait TransportWrite: Send {
    /// Write all of `bytes` to the peer.
    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Shut the connection down.
    async fn shutdown(&mut self) -> std::io::Result<()>;
}

/// A connected byte-stream transport, split into independently owned halves
/// so the receive task can read while callers write.
pub trait Transport: Send + std::fmt::Debug {
    fn into_split(self: Box<Self>) -> (Box<dyn TransportRead>, Box<dyn TransportWrite>);
}

/// Adapter turning any async byte stream into a [`Transport`].
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(stream: S) -> Self {
        StreamTransport { stream }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn into_split(self: Box<Self>) -> (Box<dyn TransportRead>, Box<dyn TransportWrite>) {
        let (read, write) = tokio::io::split(self.stream);
        (Box::new(ReadPort(read)), Box::new(WritePort(write)))
    }
}

struct ReadPort<S>(ReadHalf<S>);

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send + 'static> TransportRead for ReadPort<S> {
    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf).await
    }
}

struct WritePort<S>(WriteHalf<S>);

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send + 'static> TransportWrite for WritePort<S> {
    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.0.write_all(bytes).await?;
        self.0.flush().await
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        self.0.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_bare_host_port() {
        let ep = Endpoint::parse("192.168.42.42:129").unwrap();
        assert_eq!(ep.kind, TransportKind::Tcp);
        assert_eq!(ep.host, "192.168.42.42");
        assert_eq!(ep.port, 129);
        assert_eq!(ep.peer, None);
    }

    #[test]
    fn test_parse_tcp_schemes() {
        for scheme in ["tcp", "ecuconnect", "ecuconnect-wifi"] {
            let ep = Endpoint::parse(&format!("{scheme}://adapter.local:4000")).unwrap();
            assert_eq!(ep.kind, TransportKind::Tcp);
            assert_eq!(ep.host, "adapter.local");
            assert_eq!(ep.port, 4000);
        }
    }

    #[test]
    fn test_parse_l2cap() {
        let ep = Endpoint::parse("l2cap://fff0:129").unwrap();
        assert_eq!(ep.kind, TransportKind::Ble);
        assert_eq!(ep.host, "FFF0");
        assert_eq!(ep.port, 129);

        // PSM defaults when omitted.
        let ep = Endpoint::parse("ble://fff0").unwrap();
        assert_eq!(ep.port, 129);
    }

    #[test]
    fn test_parse_l2cap_with_peer() {
        let ep =
            Endpoint::parse("ecuconnect-l2cap://fff0:129/0a1b2c3d-0000-1000-8000-00805f9b34fb")
                .unwrap();
        assert_eq!(
            ep.peer.as_deref(),
            Some("0A1B2C3D-0000-1000-8000-00805F9B34FB")
        );
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("no-port").is_err());
        assert!(Endpoint::parse(":129").is_err());
        assert!(Endpoint::parse("tcp://host").is_err());
        assert!(Endpoint::parse("host:notaport").is_err());
        assert!(Endpoint::parse("host:0").is_err());
        assert!(Endpoint::parse("ftp://host:21").is_err());
        assert!(Endpoint::parse("l2cap://fff0:129/not-a-uuid").is_err());
    }

    #[test]
    fn test_display() {
        let ep = Endpoint::parse("10.0.0.1:200").unwrap();
        assert_eq!(ep.to_string(), "tcp://10.0.0.1:200");
    }
}
