//! Wire message shapes.

use serde::{Deserialize, Serialize};

use crate::config::ProcessingConfig;
use crate::error::{ProtoError, Result};

/// Commands understood by either side of the connection.
const KNOWN_COMMANDS: &[&str] = &[
    "PROCESS",
    "PING",
    "PONG",
    "INFO",
    "PROCESSING",
    "COMPLETE",
    "ERROR",
];

/// A single protocol message.
///
/// File payloads (`source_file`, `target_file`, `artifact`) carry the
/// `payload-codec` text encoding of the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    /// Submit a job: encoded source face image, encoded target media and the
    /// configuration snapshot to run it under.
    Process {
        source_file: String,
        target_file: String,
        #[serde(default)]
        config: ProcessingConfig,
    },
    /// Liveness probe.
    Ping,
    /// Liveness reply.
    Pong,
    /// Capability query (empty fields) or capability reply.
    Info {
        #[serde(default)]
        providers: Vec<String>,
        #[serde(default)]
        status: Option<String>,
    },
    /// Streamed progress update. Zero or more per job, `percent` is
    /// monotonically non-decreasing but not guaranteed contiguous.
    Processing {
        job_id: String,
        percent: u8,
        note: String,
    },
    /// Terminal success: the encoded output artifact.
    Complete {
        job_id: String,
        percent: u8,
        artifact: String,
    },
    /// Terminal failure, or a connection-level rejection when no job was
    /// created (`job_id` absent).
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        message: String,
    },
}

impl WireMessage {
    /// Parse a received text frame.
    ///
    /// Distinguishes frames that are not valid JSON records
    /// ([`ProtoError::Malformed`]) from well-formed frames carrying a
    /// command outside the vocabulary ([`ProtoError::UnknownCommand`]), so
    /// the receiver can word its `ERROR` reply accordingly.
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProtoError::Malformed(e.to_string()))?;
        let command = value
            .get("command")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        match serde_json::from_value(value) {
            Ok(message) => Ok(message),
            Err(e) => match command {
                Some(cmd) if !KNOWN_COMMANDS.contains(&cmd.as_str()) => {
                    Err(ProtoError::UnknownCommand(cmd))
                }
                _ => Err(ProtoError::Malformed(e.to_string())),
            },
        }
    }

    /// Serialize for transmission as a single text frame.
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtoError::Malformed(e.to_string()))
    }

    /// Whether this message concludes a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// The wire name of this message's command.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Process { .. } => "PROCESS",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Info { .. } => "INFO",
            Self::Processing { .. } => "PROCESSING",
            Self::Complete { .. } => "COMPLETE",
            Self::Error { .. } => "ERROR",
        }
    }
}
