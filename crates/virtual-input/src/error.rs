#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration invalid: {0}")]
    InvalidConfig(String),
    #[error("ffmpeg exited immediately: {stderr_tail}")]
    ExitedImmediately { stderr_tail: String },
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("v4l2loopback device {0} did not appear within the timeout")]
    DeviceTimeout(String),
    #[error("modprobe v4l2loopback failed: {0}")]
    ModprobeFailed(String),
    #[error("pulse sink or source verification failed: {0}")]
    PulseVerificationFailed(String),
    #[error("operation invalid in state {0:?}")]
    InvalidState(crate::ManagerState),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
