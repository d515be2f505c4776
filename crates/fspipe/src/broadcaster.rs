//! Server-side broadcaster: accepts many external WebSocket clients and
//! fans file-lifecycle frames out to all of them, synthesising ACKs when
//! nobody is attached so the upstream producer never blocks (spec §4.3,
//! "Broadcaster").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use vw_protocol::fspipe::{Frame, FileCreateAckPayload, MessageType, WriteAckPayload};

use crate::queue::PendingKey;

/// Per-client counters plus aggregate totals, exposed for status reporting.
#[derive(Debug, Default)]
pub struct BroadcasterStats {
    pub clients_total: AtomicU64,
    pub clients_current: AtomicU64,
    pub messages_in: AtomicU64,
    pub messages_out: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
}

struct ClientHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

/// How long a single client write is allowed to take before it's treated
/// as a slow client and skipped for this broadcast.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const SEND_AND_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Broadcaster {
    clients: DashMap<Uuid, ClientHandle>,
    pending: DashMap<PendingKey, oneshot::Sender<()>>,
    pub stats: BroadcasterStats,
}

impl Broadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { clients: DashMap::new(), pending: DashMap::new(), stats: BroadcasterStats::default() })
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/ws", get(ws_handler)).with_state(self)
    }

    /// Encode once and write to every connected client. A client whose
    /// channel is full is skipped rather than stalling the others.
    pub async fn send(&self, frame: &Frame) {
        let bytes = frame.encode();
        self.stats.messages_out.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_out.fetch_add(bytes.len() as u64, Ordering::Relaxed);

        for entry in self.clients.iter() {
            let tx = entry.value().tx.clone();
            let payload = bytes.clone();
            let _ = tokio::time::timeout(CLIENT_WRITE_TIMEOUT, tx.send(payload)).await;
        }
    }

    /// Broadcast and wait for the first ACK from any client. With no
    /// clients attached, synthesise a success ACK immediately for types
    /// that expect one, so the caller never blocks on an empty fan-out.
    pub async fn send_and_receive(&self, frame: &Frame) -> Result<(), String> {
        if !frame.message_type.requires_ack() {
            self.send(frame).await;
            return Ok(());
        }

        if self.clients.is_empty() {
            self.send(frame).await;
            return Ok(());
        }

        let key = pending_key(frame)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(key.clone(), tx);
        self.send(frame).await;

        match tokio::time::timeout(SEND_AND_RECEIVE_TIMEOUT, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err("ack channel dropped".to_string()),
            Err(_) => {
                self.pending.remove(&key);
                Err("timed out waiting for client ack".to_string())
            }
        }
    }

    fn resolve_ack(&self, frame: &Frame) {
        let Ok(key) = pending_key_from_ack(frame) else { return };
        if let Some((_, tx)) = self.pending.remove(&key) {
            let _ = tx.send(());
        }
    }

    fn register(&self) -> (Uuid, mpsc::Receiver<Vec<u8>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(64);
        self.clients.insert(id, ClientHandle { tx });
        self.stats.clients_total.fetch_add(1, Ordering::Relaxed);
        self.stats.clients_current.fetch_add(1, Ordering::Relaxed);
        (id, rx)
    }

    fn deregister(&self, id: Uuid) {
        if self.clients.remove(&id).is_some() {
            self.stats.clients_current.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

fn pending_key(frame: &Frame) -> Result<PendingKey, String> {
    match frame.message_type {
        MessageType::FileCreate => {
            let payload: vw_protocol::fspipe::FileCreatePayload =
                serde_json::from_slice(&frame.payload).map_err(|e| e.to_string())?;
            Ok(PendingKey::FileCreate(payload.file_id))
        }
        MessageType::WriteChunk => {
            let payload: vw_protocol::fspipe::WriteChunkPayload =
                serde_json::from_slice(&frame.payload).map_err(|e| e.to_string())?;
            Ok(PendingKey::WriteChunk(payload.file_id, payload.offset))
        }
        other => Err(format!("{other:?} does not require an ack")),
    }
}

fn pending_key_from_ack(frame: &Frame) -> Result<PendingKey, ()> {
    match frame.message_type {
        MessageType::FileCreateAck => {
            let payload: FileCreateAckPayload = serde_json::from_slice(&frame.payload).map_err(|_| ())?;
            Ok(PendingKey::FileCreate(payload.file_id))
        }
        MessageType::WriteAck => {
            let payload: WriteAckPayload = serde_json::from_slice(&frame.payload).map_err(|_| ())?;
            Ok(PendingKey::WriteChunk(payload.file_id, payload.offset))
        }
        _ => Err(()),
    }
}

async fn ws_handler(State(broadcaster): State<Arc<Broadcaster>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_client(broadcaster, socket))
}

async fn handle_client(broadcaster: Arc<Broadcaster>, mut socket: WebSocket) {
    let (id, mut outbound) = broadcaster.register();
    tracing::info!(client_id = %id, "broadcaster client attached");

    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                let Some(bytes) = outgoing else { break; };
                if socket.send(AxumMessage::Binary(bytes.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(AxumMessage::Binary(data))) => {
                        broadcaster.stats.messages_in.fetch_add(1, Ordering::Relaxed);
                        broadcaster.stats.bytes_in.fetch_add(data.len() as u64, Ordering::Relaxed);
                        if let Ok((frame, _)) = Frame::decode(&data) {
                            broadcaster.resolve_ack(&frame);
                        }
                    }
                    Some(Ok(AxumMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(client_id = %id, error = %e, "broadcaster client read error");
                        break;
                    }
                }
            }
        }
    }

    broadcaster.deregister(id);
    tracing::info!(client_id = %id, "broadcaster client detached");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_synthesizes_ack_with_no_clients() {
        let broadcaster = Broadcaster::new();
        let payload = vw_protocol::fspipe::FileCreatePayload { file_id: "f1".to_string(), filename: "a.bin".to_string() };
        let frame = Frame::new(MessageType::FileCreate, serde_json::to_vec(&payload).unwrap());
        assert!(broadcaster.send_and_receive(&frame).await.is_ok());
    }

    #[tokio::test]
    async fn send_and_receive_skips_ack_wait_for_non_ack_types() {
        let broadcaster = Broadcaster::new();
        let frame = Frame::new(MessageType::Delete, b"{}".to_vec());
        assert!(broadcaster.send_and_receive(&frame).await.is_ok());
    }

    #[test]
    fn pending_key_from_ack_matches_write_ack() {
        let payload = WriteAckPayload { file_id: "f1".to_string(), offset: 10 };
        let frame = Frame::new(MessageType::WriteAck, serde_json::to_vec(&payload).unwrap());
        assert_eq!(pending_key_from_ack(&frame).unwrap(), PendingKey::WriteChunk("f1".to_string(), 10));
    }
}
