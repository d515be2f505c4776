//! FFmpeg child-process supervision (spec §4.2, "Child supervision").

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::{PipelineError, Result};

/// How many trailing stderr lines to keep for "ffmpeg exited immediately"
/// diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// How long a freshly spawned child must survive before the spawn is
/// considered successful.
const STARTUP_GRACE: Duration = Duration::from_millis(300);

/// Bound on how long `Stop` waits for a graceful SIGTERM exit before
/// escalating to SIGKILL.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running ffmpeg child, its process group id, and a live tail of its
/// stderr output for diagnostics.
pub struct Supervised {
    child: Child,
    pub pgid: nix::unistd::Pid,
    stderr_tail: std::sync::Arc<parking_lot::Mutex<VecDeque<String>>>,
}

impl Supervised {
    /// Spawn `ffmpeg_path args...` in its own process group, with stdout
    /// discarded and stderr tailed into a ring buffer. Waits `STARTUP_GRACE`
    /// to confirm the process didn't die immediately.
    pub async fn spawn(ffmpeg_path: &str, args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(ffmpeg_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        // SAFETY: pre_exec runs in the forked child between fork and exec,
        // before any other thread exists in that process; setsid() is
        // async-signal-safe and just establishes a new session/process
        // group so the whole ffmpeg tree can be signaled together.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(PipelineError::Spawn)?;
        let pid = child.id().ok_or_else(|| {
            PipelineError::Spawn(std::io::Error::other("spawned child has no pid"))
        })?;
        let pgid = nix::unistd::Pid::from_raw(pid as i32);

        let stderr_tail = std::sync::Arc::new(parking_lot::Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        if let Some(stderr) = child.stderr.take() {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut tail = tail.lock();
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        tokio::select! {
            status = child.wait() => {
                let tail = stderr_tail.lock().iter().cloned().collect::<Vec<_>>().join("\n");
                return Err(match status {
                    Ok(_) => PipelineError::ExitedImmediately { stderr_tail: tail },
                    Err(e) => PipelineError::Io(e),
                });
            }
            _ = tokio::time::sleep(STARTUP_GRACE) => {}
        }

        Ok(Self { child, pgid, stderr_tail })
    }

    /// Wait for the child to exit (used by the manager's watcher task).
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Non-blocking check for exit, used by the manager's polling watcher so
    /// it never holds the manager mutex across a long await.
    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }

    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.lock().iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// SIGTERM the whole process group, wait up to `STOP_TIMEOUT`, then
    /// SIGKILL the group if it hasn't exited.
    pub async fn stop(mut self) {
        let _ = nix::sys::signal::killpg(self.pgid, nix::sys::signal::Signal::SIGTERM);

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(pgid = self.pgid.as_raw(), "ffmpeg did not exit after SIGTERM, sending SIGKILL");
                let _ = nix::sys::signal::killpg(self.pgid, nix::sys::signal::Signal::SIGKILL);
                let _ = self.child.wait().await;
            }
        }
    }
}
