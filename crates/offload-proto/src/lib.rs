//! # Offload Protocol
//!
//! Message vocabulary and configuration snapshot exchanged between the local
//! client and the remote swap worker.
//!
//! Every message is a single JSON text frame with a mandatory `command` tag.
//! Client to server: `PROCESS`, `PING`, `INFO`. Server to client: `PONG`,
//! `INFO`, `PROCESSING`, `COMPLETE`, `ERROR`. Exactly one terminal message
//! (`COMPLETE` or `ERROR`) concludes each submitted job.

mod address;
mod config;
mod error;
mod message;

pub use address::{DEFAULT_PORT, normalize_server_url};
pub use config::{ProcessingConfig, VideoEncoder};
pub use error::{ProtoError, Result};
pub use message::WireMessage;
