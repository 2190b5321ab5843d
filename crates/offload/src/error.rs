//! Offload error taxonomy.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, OffloadError>;

/// Errors crossing the offload boundary.
///
/// The worker never lets one of these terminate a connection: per-job
/// failures are reported as `ERROR` messages and the session stays open.
/// The client converts every variant into a boolean failure plus a short
/// status string, which in turn triggers local fallback.
#[derive(Error, Debug)]
pub enum OffloadError {
    #[error("connection refused by {address} (is the worker running?)")]
    ConnectionRefused { address: String },

    #[error("host not found: {address}")]
    HostUnresolvable { address: String },

    #[error("timed out while {operation}")]
    Timeout { operation: &'static str },

    #[error("connection closed before a terminal message")]
    ConnectionClosed,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Failure reported by the worker in an `ERROR` message.
    #[error("worker reported failure: {message}")]
    Remote {
        job_id: Option<String>,
        message: String,
    },

    #[error(transparent)]
    Pipeline(#[from] swap_pipeline::PipelineError),

    #[error("websocket transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<payload_codec::CodecError> for OffloadError {
    fn from(e: payload_codec::CodecError) -> Self {
        match e {
            payload_codec::CodecError::MalformedPayload(inner) => {
                Self::MalformedPayload(inner.to_string())
            }
            payload_codec::CodecError::Io(io) => Self::Io(io),
        }
    }
}

impl From<offload_proto::ProtoError> for OffloadError {
    fn from(e: offload_proto::ProtoError) -> Self {
        match e {
            offload_proto::ProtoError::Malformed(detail) => Self::MalformedPayload(detail),
            offload_proto::ProtoError::UnknownCommand(cmd) => {
                Self::ProtocolViolation(format!("unknown command `{cmd}`"))
            }
        }
    }
}

impl From<tungstenite::Error> for OffloadError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Classify a connection-establishment failure against `address` into the
/// taxonomy, so refused, unresolvable and transport failures surface with
/// distinct messages.
pub(crate) fn classify_connect_error(address: &str, e: tungstenite::Error) -> OffloadError {
    match &e {
        tungstenite::Error::Io(io) => match io.kind() {
            std::io::ErrorKind::ConnectionRefused => OffloadError::ConnectionRefused {
                address: address.to_string(),
            },
            std::io::ErrorKind::TimedOut => OffloadError::Timeout {
                operation: "connecting to the worker",
            },
            _ if io.to_string().contains("lookup") => OffloadError::HostUnresolvable {
                address: address.to_string(),
            },
            _ => OffloadError::Transport(io.to_string()),
        },
        tungstenite::Error::Url(_) => OffloadError::ProtocolViolation(format!(
            "invalid worker address `{address}` (expected host:port)"
        )),
        _ => e.into(),
    }
}
