//! Caller-visible status reporting.

use tracing::info;

/// Sink for short, human-readable status lines.
///
/// The GUI shows these in its status bar; the CLI logs them. Progress
/// messages streamed from the worker land here and are otherwise discarded.
pub trait StatusSink: Send + Sync {
    fn update(&self, message: &str);
}

/// Default sink that forwards status lines to the log.
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn update(&self, message: &str) {
        info!("{message}");
    }
}
