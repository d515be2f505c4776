//! Shared data types for the virtual input pipeline manager (spec §3, §4.2).

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Which kind of media source feeds a pipeline leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Stream,
    Socket,
    WebRtc,
}

/// A single video or audio source. Used by value, never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub kind: SourceKind,
    /// URL or path. Defaults to a known FIFO path for socket/webrtc sources
    /// when left empty — see `Config::normalize`.
    #[serde(default)]
    pub url: String,
    /// File-only: loop playback when it reaches EOF.
    #[serde(default)]
    pub r#loop: bool,
    /// Container format hint (e.g. "mpegts", "mp3", "ivf", "ogg").
    /// Defaults are applied per source kind by `Config::normalize`.
    #[serde(default)]
    pub container: Option<String>,
}

/// Pipeline configuration requested by a client. Normalized by
/// `vw-virtual-input::config::normalize` before it reaches the manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub video: Option<MediaSource>,
    #[serde(default)]
    pub audio: Option<MediaSource>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub frame_rate: u32,
}

/// Session state machine states (spec §4.2 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Running,
    Paused,
}

/// Snapshot returned by every public manager operation.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: ManagerState,
    pub video_device: Option<String>,
    pub audio_sink: Option<String>,
    pub effective_config: Option<Config>,
    #[serde(with = "started_at_serde")]
    pub started_at: Option<SystemTime>,
    pub last_error: Option<String>,
}

mod started_at_serde {
    use serde::Serializer;
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(
        value: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => {
                let secs = t
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                serializer.serialize_some(&secs)
            }
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_source_defaults_to_no_loop() {
        let json = r#"{"kind":"file","url":"/tmp/clip.mp4"}"#;
        let src: MediaSource = serde_json::from_str(json).unwrap();
        assert!(!src.r#loop);
        assert_eq!(src.container, None);
    }

    #[test]
    fn config_defaults_dimensions_to_zero() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.width, 0);
        assert_eq!(cfg.height, 0);
        assert_eq!(cfg.frame_rate, 0);
        assert!(cfg.video.is_none());
        assert!(cfg.audio.is_none());
    }

    #[test]
    fn status_serializes_started_at_as_epoch_secs() {
        let status = Status {
            state: ManagerState::Running,
            video_device: Some("/dev/video20".to_string()),
            audio_sink: None,
            effective_config: None,
            started_at: Some(std::time::UNIX_EPOCH + std::time::Duration::from_secs(42)),
            last_error: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["started_at"], 42);
        assert_eq!(json["state"], "running");
    }
}
