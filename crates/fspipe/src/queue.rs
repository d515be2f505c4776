//! Bounded FIFO queue with a pending-ACK map, shared by the TCP and
//! WebSocket transport clients (spec §4.3, "Queue").

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use vw_protocol::fspipe::Frame;

use crate::error::QueueError;

/// Key correlating an application-level ACK back to the message that needs
/// it. `WriteChunk` is keyed by file id *and* offset since a file may have
/// many chunks outstanding at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PendingKey {
    FileCreate(String),
    WriteChunk(String, u64),
}

/// Outcome delivered to `EnqueueSync` callers and to pending entries that
/// exhaust their retries.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Sent,
    Failed(String),
}

pub struct QueuedMessage {
    pub frame: Frame,
    pub retries: u32,
    pub enqueued_at: Instant,
    pub result_tx: Option<oneshot::Sender<SendOutcome>>,
}

impl QueuedMessage {
    pub fn new(frame: Frame) -> Self {
        Self { frame, retries: 0, enqueued_at: Instant::now(), result_tx: None }
    }

    fn complete(&mut self, outcome: SendOutcome) {
        if let Some(tx) = self.result_tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

struct State {
    items: VecDeque<QueuedMessage>,
    pending: HashMap<PendingKey, QueuedMessage>,
}

/// Bounded FIFO queue. `Enqueue` never blocks; `EnqueueSync` blocks on a
/// oneshot result channel. `Dequeue` is meant to have exactly one consumer
/// (the send loop).
pub struct Queue {
    state: Mutex<State>,
    capacity: usize,
    max_retries: u32,
    ack_timeout: Duration,
    notify: Notify,
    closed: AtomicBool,
}

impl Queue {
    pub fn new(capacity: usize, max_retries: u32, ack_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State { items: VecDeque::with_capacity(capacity.min(1024)), pending: HashMap::new() }),
            capacity,
            max_retries,
            ack_timeout,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Non-blocking enqueue. Fails fast when the queue is closed or full.
    pub fn enqueue(&self, frame: Frame) -> Result<(), QueueError> {
        self.enqueue_message(QueuedMessage::new(frame))
    }

    /// Enqueue and block until the message's result channel fires (sent or
    /// terminally failed).
    pub async fn enqueue_sync(&self, frame: Frame) -> Result<(), QueueError> {
        let (tx, rx) = oneshot::channel();
        let mut message = QueuedMessage::new(frame);
        message.result_tx = Some(tx);
        self.enqueue_message(message)?;
        match rx.await {
            Ok(SendOutcome::Sent) => Ok(()),
            Ok(SendOutcome::Failed(reason)) => Err(QueueError::Full).map_err(|_| match reason.as_str() {
                "shutting down" => QueueError::ShuttingDown,
                _ => QueueError::MaxRetriesExceeded,
            }),
            Err(_) => Err(QueueError::Cancelled),
        }
    }

    fn enqueue_message(&self, message: QueuedMessage) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let mut state = self.state.lock();
        if state.items.len() >= self.capacity {
            return Err(QueueError::Full);
        }
        state.items.push_back(message);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for and remove the next message. Returns `None` once the queue
    /// is closed and drained.
    pub async fn dequeue(&self) -> Option<QueuedMessage> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(message) = state.items.pop_front() {
                    return Some(message);
                }
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Register a message as awaiting an application-level ACK.
    pub fn track_pending(&self, key: PendingKey, message: QueuedMessage) {
        self.state.lock().pending.insert(key, message);
    }

    /// Resolve a pending ACK, marking the message sent successfully.
    pub fn resolve_pending(&self, key: &PendingKey) -> bool {
        let mut state = self.state.lock();
        if let Some(mut message) = state.pending.remove(key) {
            message.complete(SendOutcome::Sent);
            true
        } else {
            false
        }
    }

    /// Move every pending entry back to the head of the queue, in original
    /// enqueue order, so a reconnect re-sends everything still unacked
    /// before new traffic.
    pub fn retry_pending(&self) {
        let mut state = self.state.lock();
        let mut pending: Vec<(PendingKey, QueuedMessage)> = state.pending.drain().collect();
        pending.sort_by_key(|(_, m)| m.enqueued_at);
        for (_, message) in pending.into_iter().rev() {
            state.items.push_front(message);
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Sweep the pending map for entries that have exceeded the ACK timeout,
    /// re-enqueuing them (up to `max_retries`) or failing them terminally.
    pub fn sweep_ack_timeouts(&self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        {
            let mut state = self.state.lock();
            let keys: Vec<PendingKey> = state
                .pending
                .iter()
                .filter(|(_, m)| now.duration_since(m.enqueued_at) >= self.ack_timeout)
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                if let Some(message) = state.pending.remove(&key) {
                    expired.push(message);
                }
            }
        }

        for mut message in expired {
            if message.retries >= self.max_retries {
                message.complete(SendOutcome::Failed("max retries exceeded".to_string()));
            } else {
                message.retries += 1;
                message.enqueued_at = Instant::now();
                let mut state = self.state.lock();
                state.items.push_front(message);
                drop(state);
                self.notify.notify_one();
            }
        }
    }

    /// Idempotent shutdown: marks closed and wakes every waiting consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.state.lock();
        for mut message in state.items.drain(..) {
            message.complete(SendOutcome::Failed("shutting down".to_string()));
        }
        for (_, mut message) in state.pending.drain() {
            message.complete(SendOutcome::Failed("shutting down".to_string()));
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vw_protocol::fspipe::{Frame, MessageType};

    fn frame() -> Frame {
        Frame::new(MessageType::Delete, b"{}".to_vec())
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_roundtrips() {
        let queue = Queue::new(4, 3, Duration::from_secs(1));
        queue.enqueue(frame()).unwrap();
        let message = queue.dequeue().await.unwrap();
        assert_eq!(message.frame.message_type, MessageType::Delete);
    }

    #[tokio::test]
    async fn enqueue_fails_when_full() {
        let queue = Queue::new(1, 3, Duration::from_secs(1));
        queue.enqueue(frame()).unwrap();
        assert!(matches!(queue.enqueue(frame()), Err(QueueError::Full)));
    }

    #[tokio::test]
    async fn close_drains_and_unblocks_dequeue() {
        let queue = Queue::new(4, 3, Duration::from_secs(1));
        queue.enqueue(frame()).unwrap();
        queue.close();
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn retry_pending_restores_enqueue_order_at_head() {
        let queue = Queue::new(8, 3, Duration::from_secs(1));
        let mut first = QueuedMessage::new(frame());
        first.enqueued_at = Instant::now();
        queue.track_pending(PendingKey::FileCreate("a".into()), first);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut second = QueuedMessage::new(frame());
        second.enqueued_at = Instant::now();
        queue.track_pending(PendingKey::FileCreate("b".into()), second);

        queue.enqueue(frame()).unwrap(); // a third, already-queued item
        queue.retry_pending();

        // both pending entries should now be ahead of the pre-existing item
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn resolve_pending_completes_result_channel() {
        let queue = Queue::new(4, 3, Duration::from_secs(1));
        let (tx, rx) = oneshot::channel();
        let mut message = QueuedMessage::new(frame());
        message.result_tx = Some(tx);
        queue.track_pending(PendingKey::FileCreate("a".into()), message);

        assert!(queue.resolve_pending(&PendingKey::FileCreate("a".into())));
        assert!(matches!(rx.await.unwrap(), SendOutcome::Sent));
    }
}
