//! Pipeline error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while running the processing pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No stage is registered under the requested name.
    #[error("unknown frame processor `{0}`")]
    UnknownProcessor(String),

    /// A stage precondition failed: no usable face in the source image.
    #[error("no face detected in the source image")]
    NoFaceDetected,

    /// A stage failed while executing.
    #[error("frame processor `{processor}` failed: {reason}")]
    StageFailure { processor: String, reason: String },

    /// The content filter rejected the target before processing began.
    #[error("target rejected by the {filter} content filter")]
    ContentRejected { filter: String },

    /// Spawning or running the external encoder failed.
    #[error("ffmpeg failed ({operation}): {detail}")]
    Ffmpeg {
        operation: &'static str,
        detail: String,
    },

    /// The target is neither a known image nor a processable video.
    #[error("unsupported media file: {0}")]
    UnsupportedMedia(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
