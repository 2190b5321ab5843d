//! Offload client: connectivity probing and remote job submission.

use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use offload_proto::{ProcessingConfig, WireMessage, normalize_server_url};

use crate::error::{OffloadError, Result, classify_connect_error};
use crate::status::StatusSink;

/// Bound on the liveness and capability probes. The processing round-trip
/// itself has no hard timeout; long video jobs may run arbitrarily long and
/// stay cancellable by dropping the connection.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client side of the offload protocol.
pub struct OffloadClient {
    server_url: String,
}

impl OffloadClient {
    /// Create a client for an operator-supplied address (`host:port` with or
    /// without scheme).
    pub fn new(address: &str) -> Self {
        Self {
            server_url: normalize_server_url(address),
        }
    }

    /// The normalized worker URL this client connects to.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Short-lived connectivity probe: PING/PONG within [`PROBE_TIMEOUT`],
    /// then a best-effort INFO query for backend capability.
    ///
    /// An INFO timeout still counts as success (connected, capability
    /// unknown); a PING timeout, refused connection and unresolvable host
    /// each fail with a distinct message.
    pub async fn test_connection(&self) -> (bool, String) {
        let mut ws = match timeout(PROBE_TIMEOUT, connect_async(&self.server_url)).await {
            Err(_) => {
                return (
                    false,
                    OffloadError::Timeout {
                        operation: "connecting to the worker",
                    }
                    .to_string(),
                );
            }
            Ok(Err(e)) => return (false, classify_connect_error(&self.server_url, e).to_string()),
            Ok(Ok((ws, _))) => ws,
        };

        if let Err(e) = send(&mut ws, &WireMessage::Ping).await {
            return (false, OffloadError::from(e).to_string());
        }
        match timeout(PROBE_TIMEOUT, next_message(&mut ws)).await {
            Err(_) => (
                false,
                "timed out waiting for the liveness reply".to_string(),
            ),
            Ok(None) => (false, OffloadError::ConnectionClosed.to_string()),
            Ok(Some(Err(e))) => (false, OffloadError::from(e).to_string()),
            Ok(Some(Ok(WireMessage::Pong))) => self.probe_capabilities(&mut ws).await,
            Ok(Some(Ok(other))) => (
                false,
                format!("unexpected {} reply to the liveness probe", other.command()),
            ),
        }
    }

    async fn probe_capabilities(&self, ws: &mut WsStream) -> (bool, String) {
        let info = WireMessage::Info {
            providers: vec![],
            status: None,
        };
        if send(ws, &info).await.is_err() {
            return (true, "connected, capability unknown".to_string());
        }
        match timeout(PROBE_TIMEOUT, next_message(ws)).await {
            Ok(Some(Ok(WireMessage::Info { providers, .. }))) if !providers.is_empty() => (
                true,
                format!("connected, backends: {}", providers.join(", ")),
            ),
            Ok(Some(Ok(WireMessage::Info { .. }))) => (true, "connected".to_string()),
            // Capability is informational only; a quiet or odd reply does
            // not fail the probe.
            _ => (true, "connected, capability unknown".to_string()),
        }
    }

    /// Submit one job and stream back its result.
    ///
    /// Returns `true` when the artifact was persisted at `output`. All
    /// network and protocol failures are converted into `false` plus a
    /// status line; nothing propagates as a panic or error.
    pub async fn process_remote(
        &self,
        source: &Path,
        target: &Path,
        output: &Path,
        config: &ProcessingConfig,
        status: &dyn StatusSink,
    ) -> bool {
        match self.try_process_remote(source, target, output, config, status).await {
            Ok(()) => true,
            Err(e) => {
                warn!(worker = %self.server_url, error = %e, "remote processing failed");
                status.update(&format!("Remote processing failed: {e}"));
                false
            }
        }
    }

    async fn try_process_remote(
        &self,
        source: &Path,
        target: &Path,
        output: &Path,
        config: &ProcessingConfig,
        status: &dyn StatusSink,
    ) -> Result<()> {
        status.update("Connecting to the offload worker...");
        let (mut ws, _) = connect_async(&self.server_url)
            .await
            .map_err(|e| classify_connect_error(&self.server_url, e))?;

        status.update("Connected, encoding inputs...");
        let source_file = payload_codec::encode_file(source).await?;
        let target_file = payload_codec::encode_file(target).await?;
        let request = WireMessage::Process {
            source_file,
            target_file,
            config: config.clone(),
        };
        send(&mut ws, &request).await?;
        status.update("Job submitted, waiting for the worker...");

        loop {
            let Some(message) = next_message(&mut ws).await else {
                return Err(OffloadError::ConnectionClosed);
            };
            match message? {
                WireMessage::Processing { percent, note, .. } => {
                    status.update(&format!("{note} ({percent}%)"));
                }
                WireMessage::Complete { artifact, job_id, .. } => {
                    debug!(%job_id, "job completed remotely");
                    status.update("Saving result...");
                    payload_codec::write_decoded(&artifact, output).await?;
                    status.update("Remote processing finished");
                    return Ok(());
                }
                WireMessage::Error { job_id, message } => {
                    return Err(OffloadError::Remote { job_id, message });
                }
                // Keep-alive chatter between progress updates is fine.
                WireMessage::Pong | WireMessage::Info { .. } => {}
                other => {
                    return Err(OffloadError::ProtocolViolation(format!(
                        "unexpected {} while awaiting the job result",
                        other.command()
                    )));
                }
            }
        }
    }
}

/// Send one protocol message as a text frame.
async fn send(
    ws: &mut WsStream,
    message: &WireMessage,
) -> std::result::Result<(), tokio_tungstenite::tungstenite::Error> {
    let text = message
        .to_text()
        .map_err(|e| tokio_tungstenite::tungstenite::Error::Io(std::io::Error::other(e)))?;
    ws.send(Message::text(text)).await
}

/// Await the next protocol message, skipping transport-level frames.
///
/// Returns `None` once the connection is closed.
async fn next_message(
    ws: &mut WsStream,
) -> Option<std::result::Result<WireMessage, OffloadError>> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => {
                return Some(WireMessage::parse(text.as_str()).map_err(OffloadError::from));
            }
            Ok(Message::Close(_)) => return None,
            Ok(_) => {} // ping/pong/binary frames
            Err(e) => return Some(Err(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_normalized_on_construction() {
        assert_eq!(
            OffloadClient::new("10.0.0.2:8765").server_url(),
            "ws://10.0.0.2:8765"
        );
        assert_eq!(
            OffloadClient::new("wss://gpu:9000").server_url(),
            "wss://gpu:9000"
        );
    }
}
