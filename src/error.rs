// src/error.rs
//
// Error types for the CANyonero client engine.

use crate::protocol::PduType;

/// Errors surfaced by the client engine and its protocol layers.
///
/// Variants carry owned strings so the receive task can record a fatal
/// condition once and every later caller can observe a clone of it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A frame failed structural validation. Handled inside the stream
    /// reassembler by resynchronizing; never fatal on its own.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// The stream declared a frame larger than the configured maximum.
    /// Fatal to the connection.
    #[error("incoming PDU of {declared} bytes exceeds maximum of {max}")]
    FrameTooLarge { declared: usize, max: usize },

    /// An operation did not receive a matching reply within its timeout.
    #[error("timed out waiting for adapter response")]
    Timeout,

    /// The adapter rejected an RPC call with the given reply type.
    #[error("adapter rejected RPC call: {kind:?}")]
    Rpc { kind: PduType },

    /// An RPC response arrived but could not be decoded (invalid JSON,
    /// id mismatch, or a result that is neither an object nor null).
    #[error("invalid RPC response: {reason}")]
    RpcDecode { reason: String },

    /// Caller misuse detected before any I/O was performed.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// I/O failure on the underlying transport. Fatal to the connection.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// An operation referenced a channel handle the manager does not know.
    #[error("unknown channel handle {handle}")]
    UnknownChannel { handle: u8 },

    /// The engine is not connected (never connected, closed, or the
    /// receive path terminated).
    #[error("not connected")]
    NotConnected,

    /// An endpoint string could not be parsed.
    #[error("invalid endpoint: {reason}")]
    InvalidEndpoint { reason: String },
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedFrame {
            reason: reason.into(),
        }
    }

    pub fn rpc_decode(reason: impl Into<String>) -> Self {
        Error::RpcDecode {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_endpoint(reason: impl Into<String>) -> Self {
        Error::InvalidEndpoint {
            reason: reason.into(),
        }
    }

    /// Whether this error terminates the connection (as opposed to failing
    /// only the operation that observed it).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FrameTooLarge { .. } | Error::Transport { .. } | Error::NotConnected
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
