//! TCP and WebSocket transport clients that drain a [`Queue`] onto the
//! wire and resolve pending ACKs from the peer's replies (spec §4.3,
//! "Transport clients"). Reconnect follows the exponential-backoff shape
//! used for the upstream signaling connection elsewhere in this workspace.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use vw_protocol::fspipe::{
    Frame, FileCreateAckPayload, MessageType, WriteAckPayload, FRAME_HEADER_SIZE,
};

use crate::error::TransportError;
use crate::queue::{PendingKey, Queue};

/// Connection lifecycle, exposed for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ClientState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            _ => Self::Failed,
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Reconnecting => 3,
            Self::Failed => 4,
        }
    }
}

/// Where the client dials: `Tcp` opens a raw stream and frames it with the
/// wire header; `WebSocket` frames one [`Frame`] per binary message.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Tcp(String),
    WebSocket(String),
}

enum Wire {
    Tcp(TcpStream, BytesMut),
    WebSocket(WebSocketStream<MaybeTlsStream<TcpStream>>, BytesMut),
}

impl Wire {
    async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| TransportError::Connect(e.to_string()))?;
                Ok(Self::Tcp(stream, BytesMut::with_capacity(8 * 1024)))
            }
            Endpoint::WebSocket(url) => {
                let (stream, _response) = tokio_tungstenite::connect_async(url)
                    .await
                    .map_err(|e| TransportError::Connect(e.to_string()))?;
                Ok(Self::WebSocket(stream, BytesMut::with_capacity(8 * 1024)))
            }
        }
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let bytes = frame.encode();
        match self {
            Self::Tcp(stream, _) => {
                stream.write_all(&bytes).await.map_err(|e| TransportError::Write(e.to_string()))?;
            }
            Self::WebSocket(stream, _) => {
                stream
                    .send(WsMessage::Binary(bytes.into()))
                    .await
                    .map_err(|e| TransportError::Write(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Pull the next complete frame off the wire, reading more bytes as
    /// needed. Returns `Ok(None)` when the peer closed the connection.
    async fn recv_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let buf: &mut BytesMut = match self {
                Self::Tcp(_, buf) => buf,
                Self::WebSocket(_, buf) => buf,
            };
            if buf.len() >= FRAME_HEADER_SIZE {
                match Frame::decode(buf) {
                    Ok((frame, consumed)) => {
                        let _ = buf.split_to(consumed);
                        return Ok(Some(frame));
                    }
                    Err(vw_protocol::fspipe::FrameError::IncompletePayload { .. }) => {}
                    Err(vw_protocol::fspipe::FrameError::TooShort(_)) => {}
                    Err(e) => return Err(TransportError::Frame(e)),
                }
            }

            match self {
                Self::Tcp(stream, buf) => {
                    let mut chunk = [0u8; 4096];
                    let n = stream.read(&mut chunk).await?;
                    if n == 0 {
                        return Ok(None);
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                Self::WebSocket(stream, buf) => match stream.next().await {
                    Some(Ok(WsMessage::Binary(data))) => buf.extend_from_slice(&data),
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(TransportError::Connect(e.to_string())),
                },
            }
        }
    }
}

/// Drives a [`Queue`] over a single transport connection, reconnecting
/// with exponential backoff whenever the connection drops.
pub struct TransportClient {
    endpoint: Endpoint,
    queue: Arc<Queue>,
    state: Arc<AtomicU8>,
    health_check_interval: Duration,
}

impl TransportClient {
    pub fn new(endpoint: Endpoint, queue: Arc<Queue>, health_check_interval: Duration) -> Self {
        Self { endpoint, queue, state: Arc::new(AtomicU8::new(ClientState::Disconnected.tag())), health_check_interval }
    }

    pub fn state(&self) -> ClientState {
        ClientState::from_tag(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state.tag(), Ordering::Relaxed);
    }

    /// Run until the queue is closed. Intended to be spawned as its own
    /// task; never returns before shutdown.
    pub async fn run(self) {
        let mut backoff = Duration::from_millis(500);
        let max_backoff = Duration::from_secs(30);

        loop {
            self.set_state(ClientState::Connecting);
            match Wire::connect(&self.endpoint).await {
                Ok(wire) => {
                    tracing::info!(endpoint = ?self.endpoint, "fspipe transport connected");
                    self.set_state(ClientState::Connected);
                    backoff = Duration::from_millis(500);
                    self.queue.retry_pending();

                    match self.drive(wire).await {
                        Ok(()) => {
                            tracing::info!("fspipe transport closed cleanly, shutting down");
                            self.set_state(ClientState::Disconnected);
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "fspipe transport connection lost");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fspipe transport connect failed");
                }
            }

            if self.queue.is_closed() {
                self.set_state(ClientState::Disconnected);
                return;
            }
            self.set_state(ClientState::Reconnecting);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    /// Drive a single connected session: pump the queue out and ACKs in,
    /// giving up (for reconnect) if nothing crosses the wire within
    /// `3 * health_check_interval`.
    async fn drive(&self, mut wire: Wire) -> Result<(), TransportError> {
        let mut last_activity = Instant::now();
        let stall_after = self.health_check_interval * 3;

        loop {
            tokio::select! {
                sent = self.queue.dequeue() => {
                    let Some(mut message) = sent else { return Ok(()); };
                    wire.send_frame(&message.frame).await?;
                    last_activity = Instant::now();

                    if message.frame.message_type.requires_ack() {
                        let key = pending_key(&message.frame)?;
                        self.queue.track_pending(key, message);
                    } else if let Some(tx) = message.result_tx.take() {
                        let _ = tx.send(crate::queue::SendOutcome::Sent);
                    }
                }
                received = wire.recv_frame() => {
                    match received? {
                        Some(frame) => {
                            last_activity = Instant::now();
                            self.handle_ack(&frame);
                        }
                        None => return Err(TransportError::Connect("peer closed connection".to_string())),
                    }
                }
                _ = tokio::time::sleep(self.health_check_interval) => {
                    if last_activity.elapsed() > stall_after {
                        return Err(TransportError::Connect("no wire activity within health-check window".to_string()));
                    }
                }
            }
        }
    }

    fn handle_ack(&self, frame: &Frame) {
        match frame.message_type {
            MessageType::FileCreateAck => {
                if let Ok(payload) = serde_json::from_slice::<FileCreateAckPayload>(&frame.payload) {
                    self.queue.resolve_pending(&PendingKey::FileCreate(payload.file_id));
                }
            }
            MessageType::WriteAck => {
                if let Ok(payload) = serde_json::from_slice::<WriteAckPayload>(&frame.payload) {
                    self.queue.resolve_pending(&PendingKey::WriteChunk(payload.file_id, payload.offset));
                }
            }
            other => {
                tracing::debug!(?other, "ignoring non-ack frame from peer");
            }
        }
    }
}

fn pending_key(frame: &Frame) -> Result<PendingKey, TransportError> {
    match frame.message_type {
        MessageType::FileCreate => {
            let payload: vw_protocol::fspipe::FileCreatePayload = serde_json::from_slice(&frame.payload)?;
            Ok(PendingKey::FileCreate(payload.file_id))
        }
        MessageType::WriteChunk => {
            let payload: vw_protocol::fspipe::WriteChunkPayload = serde_json::from_slice(&frame.payload)?;
            Ok(PendingKey::WriteChunk(payload.file_id, payload.offset))
        }
        other => Err(TransportError::Write(format!("{other:?} does not require an ack"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_state_tag_roundtrip() {
        for state in [
            ClientState::Disconnected,
            ClientState::Connecting,
            ClientState::Connected,
            ClientState::Reconnecting,
            ClientState::Failed,
        ] {
            assert_eq!(ClientState::from_tag(state.tag()), state);
        }
    }

    #[test]
    fn pending_key_rejects_non_ack_types() {
        let frame = Frame::new(MessageType::Delete, b"{}".to_vec());
        assert!(pending_key(&frame).is_err());
    }

    #[test]
    fn pending_key_extracts_write_chunk_offset() {
        let payload = vw_protocol::fspipe::WriteChunkPayload {
            file_id: "f1".to_string(),
            offset: 42,
            data: "AAAA".to_string(),
        };
        let frame = Frame::new(MessageType::WriteChunk, serde_json::to_vec(&payload).unwrap());
        let key = pending_key(&frame).unwrap();
        assert_eq!(key, PendingKey::WriteChunk("f1".to_string(), 42));
    }
}
