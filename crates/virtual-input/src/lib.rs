pub mod config;
pub mod containers;
pub mod device;
pub mod error;
pub mod ffmpeg_args;
pub mod fifo;
pub mod manager;
pub mod process;
pub mod scale_to_zero;
pub mod webrtc_ingest;

pub use error::{PipelineError, Result};
pub use manager::{ManagerConfig, PipelineManager};
pub use vw_protocol::virtual_input::ManagerState;
