//! # Offload Engine
//!
//! Remote job offload for face-swap processing: the worker that serves jobs
//! over WebSocket, the client that submits them, and the orchestrator that
//! decides between remote offload and local execution with transparent
//! fallback.

mod client;
mod error;
mod orchestrator;
mod status;
mod worker;

pub use client::{OffloadClient, PROBE_TIMEOUT};
pub use error::{OffloadError, Result};
pub use orchestrator::{BatchSummary, Orchestrator, collect_media_files, numbered_output_path};
pub use status::{LogStatus, StatusSink};
pub use worker::{OffloadWorker, WorkerConfig};
