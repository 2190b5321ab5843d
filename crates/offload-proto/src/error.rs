//! Protocol error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Errors raised while parsing or emitting wire messages.
#[derive(Error, Debug)]
pub enum ProtoError {
    /// The frame is not parseable as a protocol message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The frame parsed, but its `command` tag is not part of the vocabulary.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}
