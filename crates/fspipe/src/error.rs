#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue full")]
    Full,
    #[error("queue closed")]
    Closed,
    #[error("shutting down")]
    ShuttingDown,
    #[error("max retries exceeded")]
    MaxRetriesExceeded,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error(transparent)]
    Frame(#[from] vw_protocol::fspipe::FrameError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
