//! Pluggable content filtering.

use std::path::Path;

use crate::error::Result;

/// Pre-processing content gate.
///
/// Consulted once per file before any stage runs; a flagged target aborts
/// processing for that file only, never the surrounding batch.
pub trait ContentFilter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the target must not be processed.
    fn is_flagged(&self, path: &Path) -> Result<bool>;
}

/// Filter that never flags anything; used when filtering is disabled or no
/// classifier model is installed.
pub struct NoOpFilter;

impl ContentFilter for NoOpFilter {
    fn name(&self) -> &str {
        "noop"
    }

    fn is_flagged(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}
