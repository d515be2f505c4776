//! FIFO-open helpers for feeding the FFmpeg socket/webrtc inputs (spec §4.2,
//! "FIFO-open helpers").

use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use tokio::fs::File;

use crate::error::{PipelineError, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Open `path` for writing, retrying on `ENXIO` (no reader attached yet)
/// until `timeout` elapses.
pub async fn open_writer(path: &str, timeout: Duration) -> Result<File> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match open(path, OFlag::O_WRONLY | OFlag::O_NONBLOCK, Mode::empty()) {
            Ok(fd) => {
                let std_file: std::fs::File = fd.into();
                return Ok(File::from_std(std_file));
            }
            Err(Errno::ENXIO) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(PipelineError::Io(std::io::Error::from(Errno::ENXIO)));
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => return Err(PipelineError::Io(std::io::Error::from(e))),
        }
    }
}

/// Open `path` read-write. A FIFO opened `O_RDWR` never blocks regardless of
/// whether a peer is attached, since the opening process holds both ends —
/// used when we need to keep the pipe alive without a dedicated reader.
pub async fn open_read_writer(path: &str) -> Result<File> {
    let fd = open(path, OFlag::O_RDWR, Mode::empty()).map_err(|e| PipelineError::Io(std::io::Error::from(e)))?;
    let std_file: std::fs::File = fd.into();
    Ok(File::from_std(std_file))
}
