//! # Swap Pipeline
//!
//! Frame-processor pipeline abstraction and the local execution path shared
//! by the CLI and the remote worker.
//!
//! The actual face-swap/enhance inference is an external capability consumed
//! through the [`FrameProcessor`] trait; this crate provides the machinery
//! around it: media-kind detection, per-stage image folding, video frame
//! extraction and reassembly via ffmpeg, content filtering and acceleration
//! backend probing.

pub mod backend;
mod error;
pub mod ffmpeg;
mod filter;
mod local;
mod media;
mod processor;

pub use backend::{ExecutionBackend, probe_backends, select_backend};
pub use error::{PipelineError, Result};
pub use filter::{ContentFilter, NoOpFilter};
pub use local::{PipelineContext, process_media_file};
pub use media::{
    MediaKind, has_image_extension, is_media_file, kind_for_path, sniff_media_kind,
    sniffed_extension,
};
pub use processor::{FrameProcessor, InferenceLock, PassthroughProcessor, ProcessorRegistry};
