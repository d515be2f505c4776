//! v4l2loopback and PulseAudio device bootstrap (spec §4.2, "Device
//! bootstrap").

use std::time::Duration;

use tokio::process::Command;

use crate::error::{PipelineError, Result};

/// Wait this long for the v4l2 device node to appear after `modprobe`.
const DEVICE_APPEAR_TIMEOUT: Duration = Duration::from_secs(3);
const DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parse the numeric suffix out of a device path like `/dev/video20` (the
/// `video_nr` modprobe needs).
fn device_number(path: &str) -> Option<u32> {
    path.rsplit(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// Ensure the configured v4l2loopback device node exists, loading the kernel
/// module if it doesn't, then chmod it `0666` so an unprivileged ffmpeg can
/// open it for writing.
pub async fn ensure_video_device(device_path: &str) -> Result<()> {
    if tokio::fs::metadata(device_path).await.is_ok() {
        return Ok(());
    }

    let video_nr = device_number(device_path).ok_or_else(|| {
        PipelineError::InvalidConfig(format!("cannot parse device number from {device_path}"))
    })?;

    let output = Command::new("modprobe")
        .arg("v4l2loopback")
        .arg(format!("video_nr={video_nr}"))
        .arg("card_label=Virtual Camera")
        .arg("exclusive_caps=1")
        .output()
        .await?;
    if !output.status.success() {
        return Err(PipelineError::ModprobeFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let deadline = tokio::time::Instant::now() + DEVICE_APPEAR_TIMEOUT;
    loop {
        if tokio::fs::metadata(device_path).await.is_ok() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PipelineError::DeviceTimeout(device_path.to_string()));
        }
        tokio::time::sleep(DEVICE_POLL_INTERVAL).await;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o666);
        tokio::fs::set_permissions(device_path, perms).await?;
    }

    Ok(())
}

/// Verify a PulseAudio sink exists among `pactl list short sinks`.
pub async fn verify_pulse_sink(sink_name: &str) -> Result<()> {
    verify_pulse_entity("sinks", sink_name).await
}

/// Verify a PulseAudio source exists among `pactl list short sources`.
pub async fn verify_pulse_source(source_name: &str) -> Result<()> {
    verify_pulse_entity("sources", source_name).await
}

async fn verify_pulse_entity(kind: &str, name: &str) -> Result<()> {
    let output = Command::new("pactl").arg("list").arg("short").arg(kind).output().await?;
    if !output.status.success() {
        return Err(PipelineError::PulseVerificationFailed(format!(
            "pactl list short {kind} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.lines().any(|line| line.split_whitespace().nth(1) == Some(name)) {
        Ok(())
    } else {
        Err(PipelineError::PulseVerificationFailed(format!("{kind} entry '{name}' not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_device_number() {
        assert_eq!(device_number("/dev/video20"), Some(20));
        assert_eq!(device_number("/dev/video0"), Some(0));
        assert_eq!(device_number("/dev/novideo"), None);
    }
}
