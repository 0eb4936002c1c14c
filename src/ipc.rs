//! IPC to a UI (A5): length-prefixed JSON envelope over a per-user named
//! pipe / UNIX domain socket (§6 "IPC to a UI").
//!
//! The teacher's `ipc/` was a full JSON-RPC-over-WebSocket surface (rate
//! limiters, auth tokens, a handler registry) — `SPEC_FULL.md` explicitly
//! scopes the UI channel down to "summary only; not core": one envelope
//! type, one broadcaster. The broadcaster itself (a `tokio::sync::broadcast`
//! fan-out) is kept from `ipc/event.rs::EventBroadcaster`, since that part of
//! the teacher's shape survives unchanged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{VeilError, VeilResult};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const MAX_ENVELOPE_LEN: u32 = 1 << 20; // 1 MiB

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Connect,
    Disconnect,
    Status,
    Event,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub payload: Value,
}

/// Encodes an envelope as `len(4, BE) || json_bytes`.
pub fn encode_envelope(envelope: &Envelope) -> VeilResult<Vec<u8>> {
    let json = serde_json::to_vec(envelope).map_err(|e| VeilError::Bug(e.to_string()))?;
    if json.len() as u64 > MAX_ENVELOPE_LEN as u64 {
        return Err(VeilError::ProtocolDrop("IPC envelope too large".into()));
    }
    let mut out = Vec::with_capacity(4 + json.len());
    out.extend_from_slice(&(json.len() as u32).to_be_bytes());
    out.extend_from_slice(&json);
    Ok(out)
}

/// Reads one length-prefixed envelope from an async stream. Returns `Ok(None)`
/// on a clean EOF before any bytes of a new frame arrive.
pub async fn read_envelope<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> VeilResult<Option<Envelope>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(VeilError::Transient(e.to_string())),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_ENVELOPE_LEN {
        return Err(VeilError::ProtocolDrop("IPC envelope too large".into()));
    }
    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| VeilError::Transient(e.to_string()))?;
    let envelope: Envelope =
        serde_json::from_slice(&body).map_err(|e| VeilError::ProtocolDrop(e.to_string()))?;
    Ok(Some(envelope))
}

pub async fn write_envelope<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
) -> VeilResult<()> {
    let bytes = encode_envelope(envelope)?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| VeilError::Transient(e.to_string()))
}

/// Broadcasts status/event envelopes to every connected UI client.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Envelope>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        EventBroadcaster { tx }
    }

    pub fn broadcast(&self, kind: EnvelopeType, payload: Value) {
        let _ = self.tx.send(Envelope { kind, payload });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

#[cfg(unix)]
pub fn default_socket_path() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join("veild.sock")
}

#[cfg(unix)]
pub async fn serve_unix(
    path: &Path,
    broadcaster: EventBroadcaster,
) -> VeilResult<()> {
    let _ = std::fs::remove_file(path);
    let listener = tokio::net::UnixListener::bind(path)
        .map_err(|e| VeilError::config_fatal(format!("could not bind IPC socket: {e}"), format!("check permissions on {}", path.display())))?;

    loop {
        let (stream, _addr) = listener
            .accept()
            .await
            .map_err(|e| VeilError::Transient(e.to_string()))?;
        let mut rx = broadcaster.subscribe();
        tokio::spawn(async move {
            let (mut reader, mut writer) = stream.into_split();
            let heartbeat = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                    let envelope = Envelope { kind: EnvelopeType::Heartbeat, payload: Value::Null };
                    if write_envelope(&mut writer, &envelope).await.is_err() {
                        break;
                    }
                    while let Ok(ev) = rx.try_recv() {
                        if write_envelope(&mut writer, &ev).await.is_err() {
                            return;
                        }
                    }
                }
            });
            loop {
                match read_envelope(&mut reader).await {
                    Ok(Some(envelope)) => debug!(?envelope.kind, "received IPC envelope from UI client"),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "IPC client read error");
                        break;
                    }
                }
            }
            heartbeat.abort();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrips_through_a_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let envelope = Envelope {
            kind: EnvelopeType::Status,
            payload: serde_json::json!({ "state": "connected" }),
        };
        write_envelope(&mut a, &envelope).await.unwrap();
        let decoded = read_envelope(&mut b).await.unwrap().unwrap();
        assert_eq!(decoded.payload, envelope.payload);
    }

    #[tokio::test]
    async fn clean_eof_returns_none() {
        let (a, mut b) = tokio::io::duplex(4096);
        drop(a);
        assert!(read_envelope(&mut b).await.unwrap().is_none());
    }

    #[test]
    fn oversized_envelope_is_rejected_before_encoding() {
        let huge = Envelope {
            kind: EnvelopeType::Event,
            payload: Value::String("x".repeat((MAX_ENVELOPE_LEN as usize) + 1)),
        };
        assert!(matches!(encode_envelope(&huge), Err(VeilError::ProtocolDrop(_))));
    }
}
