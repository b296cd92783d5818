// src/transport/tcp.rs
//
// TCP transport for CANyonero adapters on the Wi-Fi interface.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{Endpoint, StreamTransport, Transport, TransportKind};

/// Connect to a TCP endpoint with a timeout and return the transport.
///
/// Sets `TCP_NODELAY`: request/response latency matters far more than
/// throughput on the command path.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Transport>> {
    debug_assert_eq!(endpoint.kind, TransportKind::Tcp);

    let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    let stream = match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(Error::transport(format!(
                "connection to {endpoint} failed: {e}"
            )))
        }
        Err(_) => {
            return Err(Error::transport(format!(
                "connection to {endpoint} timed out"
            )))
        }
    };
    stream.set_nodelay(true)?;
    debug!("connected to {endpoint}");

    Ok(Box::new(StreamTransport::new(stream)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 on localhost is about as reliably closed as it gets.
        let endpoint = Endpoint::parse("127.0.0.1:1").unwrap();
        let err = connect(&endpoint, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[tokio::test]
    async fn test_connect_loopback_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let endpoint = Endpoint::parse(&format!("127.0.0.1:{}", addr.port())).unwrap();
        let transport = connect(&endpoint, Duration::from_secs(2)).await.unwrap();

        let (_stream, _) = listener.accept().await.unwrap();
        let (_read, mut write) = transport.into_split();
        write.send(b"hello").await.unwrap();
    }
}
