pub mod broadcaster;
pub mod client;
pub mod error;
pub mod queue;
pub mod s3;

use std::sync::Arc;
use std::time::Duration;

use vw_protocol::fspipe::{Frame, MessageType};
use vw_protocol::{FspipeBackend, FspipeConfig};

use client::{Endpoint, TransportClient};
use error::TransportError;
use queue::Queue;

pub use broadcaster::Broadcaster;
pub use client::ClientState;
pub use queue::{PendingKey, SendOutcome};
pub use s3::{S3Backend, S3Error};

/// The side a fspipe producer actually writes to, selected by
/// `FspipeConfig::backend`. TCP and WebSocket share a queue + reconnecting
/// client; S3 has no queue of its own since the SDK retries internally.
pub enum Sink {
    Queued { queue: Arc<Queue>, client_task: tokio::task::JoinHandle<()> },
    S3(Arc<S3Backend>),
}

impl Sink {
    /// Build and start the sink described by `config`. For queued
    /// backends this also spawns the reconnecting transport task.
    pub async fn start(config: &FspipeConfig) -> anyhow::Result<Self> {
        match config.backend {
            FspipeBackend::Tcp | FspipeBackend::WebSocket => {
                let queue = Queue::new(
                    config.queue_capacity,
                    config.max_retries,
                    Duration::from_millis(config.ack_timeout_ms),
                );
                let endpoint = if config.backend == FspipeBackend::Tcp {
                    Endpoint::Tcp(config.bind.clone())
                } else {
                    Endpoint::WebSocket(format!("ws://{}", config.bind))
                };
                let client = TransportClient::new(
                    endpoint,
                    queue.clone(),
                    Duration::from_millis(config.health_check_interval_ms),
                );
                let client_task = tokio::spawn(client.run());
                Ok(Self::Queued { queue, client_task })
            }
            FspipeBackend::S3 => {
                let bucket = config
                    .s3_bucket
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("fspipe.backend = s3 requires fspipe.s3_bucket"))?;
                let backend =
                    S3Backend::new(bucket, config.s3_region.clone(), config.s3_endpoint.clone(), config.s3_prefix.clone())
                        .await;
                Ok(Self::S3(Arc::new(backend)))
            }
        }
    }

    /// Non-blocking enqueue for the TCP/WebSocket path; for S3, file
    /// lifecycle calls go directly through `as_s3()` instead since the S3
    /// backend has its own per-operation API rather than a frame queue.
    pub fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        match self {
            Self::Queued { queue, .. } => Ok(queue.enqueue(frame)?),
            Self::S3(_) => Err(TransportError::Write("S3 sink does not accept raw frames; use as_s3()".to_string())),
        }
    }

    pub fn as_s3(&self) -> Option<&Arc<S3Backend>> {
        match self {
            Self::S3(backend) => Some(backend),
            Self::Queued { .. } => None,
        }
    }

    pub async fn close(self) {
        match self {
            Self::Queued { queue, client_task } => {
                queue.close();
                let _ = client_task.await;
            }
            Self::S3(backend) => backend.abort_incomplete().await,
        }
    }
}

/// Whether a message type expects an application ACK, re-exported for
/// callers building frames without reaching into `vw_protocol` directly.
pub fn requires_ack(message_type: MessageType) -> bool {
    message_type.requires_ack()
}
