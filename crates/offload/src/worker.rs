//! Remote worker: accepts connections, runs submitted jobs, streams progress.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError};
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use offload_proto::{ProcessingConfig, ProtoError, WireMessage};
use swap_pipeline::{
    ExecutionBackend, PipelineContext, probe_backends, process_media_file, select_backend,
    sniff_media_kind, sniffed_extension,
};

use crate::error::OffloadError;

/// Interval between transport-level keep-alive pings.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long a pinged peer may stay silent before its connection is dropped.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<TcpStream>;

/// Worker tuning.
pub struct WorkerConfig {
    /// Directory job scratch directories are created under.
    pub scratch_root: PathBuf,
    /// Backend preference applied on top of the startup probe.
    pub preferred_backends: Vec<ExecutionBackend>,
    /// Interval between keep-alive pings.
    pub keepalive_interval: Duration,
    /// Silence window after a ping before the peer is considered gone.
    pub liveness_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
            preferred_backends: vec![],
            keepalive_interval: KEEPALIVE_INTERVAL,
            liveness_timeout: LIVENESS_TIMEOUT,
        }
    }
}

/// How a job attempt ended, seen from the connection handler.
enum JobFailure {
    /// The job itself failed; report it in-band and keep the session open.
    Job(OffloadError),
    /// The transport failed; the connection is gone.
    Send(WsError),
}

impl From<OffloadError> for JobFailure {
    fn from(e: OffloadError) -> Self {
        Self::Job(e)
    }
}

impl From<WsError> for JobFailure {
    fn from(e: WsError) -> Self {
        Self::Send(e)
    }
}

/// The remote processing worker.
///
/// Each client connection runs as an independent task; within one connection
/// jobs execute one at a time in arrival order. The acceleration backend is
/// probed once at startup and applies to every job on this instance.
pub struct OffloadWorker {
    ctx: PipelineContext,
    backends: Vec<ExecutionBackend>,
    active_backend: ExecutionBackend,
    scratch_root: PathBuf,
    keepalive_interval: Duration,
    liveness_timeout: Duration,
    clients: Mutex<HashSet<SocketAddr>>,
}

impl OffloadWorker {
    pub fn new(ctx: PipelineContext, config: WorkerConfig) -> Self {
        let backends = probe_backends();
        let active_backend = select_backend(&backends, &config.preferred_backends);
        info!(
            available = ?backends.iter().map(|b| b.as_str()).collect::<Vec<_>>(),
            active = %active_backend,
            "worker backends probed"
        );
        Self {
            ctx,
            backends,
            active_backend,
            scratch_root: config.scratch_root,
            keepalive_interval: config.keepalive_interval,
            liveness_timeout: config.liveness_timeout,
            clients: Mutex::new(HashSet::new()),
        }
    }

    /// Backend wire names advertised in `INFO` replies.
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.as_str().to_string()).collect()
    }

    pub fn active_backend(&self) -> ExecutionBackend {
        self.active_backend
    }

    /// Number of currently connected clients.
    pub async fn connected_clients(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "worker listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                worker.handle_connection(stream, peer).await;
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let mut ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(%peer, error = %e, "websocket handshake failed");
                return;
            }
        };

        let connected = {
            let mut clients = self.clients.lock().await;
            clients.insert(peer);
            clients.len()
        };
        info!(%peer, total = connected, "client connected");

        let mut keepalive = tokio::time::interval(self.keepalive_interval);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        keepalive.reset(); // skip the immediate first tick

        // Armed when a ping goes out, cleared by any inbound frame. A peer
        // that stays silent past the window is treated as gone, which covers
        // half-open connections that never reset.
        let mut silence_deadline: Option<tokio::time::Instant> = None;

        loop {
            let silence = async move {
                match silence_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = keepalive.tick() => {
                    if ws.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    if silence_deadline.is_none() {
                        silence_deadline =
                            Some(tokio::time::Instant::now() + self.liveness_timeout);
                    }
                }
                _ = silence => {
                    warn!(%peer, "no reply within the liveness window, dropping connection");
                    break;
                }
                frame = ws.next() => {
                    silence_deadline = None;
                    match frame {
                        None | Some(Ok(Message::Close(_))) => break,
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.dispatch(&mut ws, text.as_str()).await {
                                warn!(%peer, error = %e, "failed to send reply, dropping connection");
                                break;
                            }
                        }
                        Some(Ok(_)) => {} // transport frames
                        Some(Err(e)) => {
                            debug!(%peer, error = %e, "websocket read error");
                            break;
                        }
                    }
                }
            }
        }

        let remaining = {
            let mut clients = self.clients.lock().await;
            clients.remove(&peer);
            clients.len()
        };
        info!(%peer, remaining, "client disconnected");
    }

    /// Handle one inbound frame. Only transport failures bubble up; anything
    /// job- or protocol-level is answered in-band so the session survives.
    async fn dispatch(&self, ws: &mut WsStream, text: &str) -> Result<(), WsError> {
        match WireMessage::parse(text) {
            Ok(WireMessage::Ping) => send(ws, &WireMessage::Pong).await,
            Ok(WireMessage::Info { .. }) => {
                let reply = WireMessage::Info {
                    providers: self.backend_names(),
                    status: Some("online".to_string()),
                };
                send(ws, &reply).await
            }
            Ok(WireMessage::Process {
                source_file,
                target_file,
                config,
            }) => self.handle_process(ws, source_file, target_file, config).await,
            Ok(other) => {
                let reply = WireMessage::Error {
                    job_id: None,
                    message: format!("unexpected {} from a client", other.command()),
                };
                send(ws, &reply).await
            }
            Err(ProtoError::UnknownCommand(cmd)) => {
                let reply = WireMessage::Error {
                    job_id: None,
                    message: format!("unknown command `{cmd}`"),
                };
                send(ws, &reply).await
            }
            Err(ProtoError::Malformed(detail)) => {
                let reply = WireMessage::Error {
                    job_id: None,
                    message: format!("malformed message: {detail}"),
                };
                send(ws, &reply).await
            }
        }
    }

    /// One job: RECEIVED -> DECODING -> PROCESSING -> ENCODING -> terminal.
    async fn handle_process(
        &self,
        ws: &mut WsStream,
        source_file: String,
        target_file: String,
        config: ProcessingConfig,
    ) -> Result<(), WsError> {
        // Validated before any temp resources exist; no job id is assigned
        // for a request that never becomes a job.
        if source_file.is_empty() || target_file.is_empty() {
            let reply = WireMessage::Error {
                job_id: None,
                message: OffloadError::MissingInput("source and target files are required")
                    .to_string(),
            };
            return send(ws, &reply).await;
        }

        let job_id = Uuid::new_v4().to_string();
        info!(%job_id, "job received");

        let scratch = match tempfile::Builder::new()
            .prefix("rswap-job-")
            .tempdir_in(&self.scratch_root)
        {
            Ok(scratch) => scratch,
            Err(e) => {
                let reply = WireMessage::Error {
                    job_id: Some(job_id),
                    message: format!("failed to allocate scratch space: {e}"),
                };
                return send(ws, &reply).await;
            }
        };

        let outcome = self
            .run_job(ws, &job_id, scratch.path(), &source_file, &target_file, config)
            .await;

        // Cleanup runs on every path, success included.
        if let Err(e) = scratch.close() {
            warn!(%job_id, error = %e, "failed to remove job scratch directory");
        }

        match outcome {
            Ok(()) => {
                info!(%job_id, "job complete");
                Ok(())
            }
            Err(JobFailure::Job(e)) => {
                warn!(%job_id, error = %e, "job failed");
                let reply = WireMessage::Error {
                    job_id: Some(job_id),
                    message: e.to_string(),
                };
                send(ws, &reply).await
            }
            Err(JobFailure::Send(e)) => Err(e),
        }
    }

    async fn run_job(
        &self,
        ws: &mut WsStream,
        job_id: &str,
        scratch: &std::path::Path,
        source_file: &str,
        target_file: &str,
        config: ProcessingConfig,
    ) -> Result<(), JobFailure> {
        self.progress(ws, job_id, 10, "decoding inputs").await?;

        let source_bytes = payload_codec::decode(source_file).map_err(OffloadError::from)?;
        let target_bytes = payload_codec::decode(target_file).map_err(OffloadError::from)?;

        let source_path = scratch.join(format!("source.{}", sniffed_extension(&source_bytes)));
        let target_path = scratch.join(format!("target.{}", sniffed_extension(&target_bytes)));
        tokio::fs::write(&source_path, &source_bytes)
            .await
            .map_err(OffloadError::from)?;
        tokio::fs::write(&target_path, &target_bytes)
            .await
            .map_err(OffloadError::from)?;

        let config = config.normalized();
        if !config.execution_providers.is_empty() {
            // Per-job backend override is accepted but informational; the
            // probe-time selection applies process-wide.
            debug!(
                %job_id,
                requested = ?config.execution_providers,
                active = %self.active_backend,
                "per-job backend preference noted"
            );
        }

        self.progress(ws, job_id, 30, "processing target").await?;

        let output_ext = match sniff_media_kind(&target_bytes) {
            swap_pipeline::MediaKind::Image => sniffed_extension(&target_bytes),
            swap_pipeline::MediaKind::Video => config.video_encoder.container_extension(),
        };
        let output_path = scratch.join(format!("output.{output_ext}"));
        process_media_file(&self.ctx, &config, &source_path, &target_path, &output_path)
            .await
            .map_err(OffloadError::from)?;

        self.progress(ws, job_id, 90, "encoding result").await?;

        let artifact = payload_codec::encode_file(&output_path)
            .await
            .map_err(OffloadError::from)?;
        let reply = WireMessage::Complete {
            job_id: job_id.to_string(),
            percent: 100,
            artifact,
        };
        send(ws, &reply).await?;
        Ok(())
    }

    async fn progress(
        &self,
        ws: &mut WsStream,
        job_id: &str,
        percent: u8,
        note: &str,
    ) -> Result<(), JobFailure> {
        let update = WireMessage::Processing {
            job_id: job_id.to_string(),
            percent,
            note: note.to_string(),
        };
        send(ws, &update).await?;
        Ok(())
    }
}

/// Send one protocol message as a text frame.
async fn send(ws: &mut WsStream, message: &WireMessage) -> Result<(), WsError> {
    let text = message
        .to_text()
        .map_err(|e| WsError::Io(std::io::Error::other(e)))?;
    ws.send(Message::text(text)).await
}
