//! Deterministic normalization of a client-supplied pipeline `Config` (spec
//! §4.2, "Configure normalization").

use std::path::Path;

use vw_protocol::virtual_input::{Config, MediaSource, SourceKind};

use crate::error::{PipelineError, Result};

/// Manager-wide defaults applied when a request leaves a field unset.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Normalize a requested configuration: fill in dimension defaults, reject
/// configurations with neither source, and fill per-source-kind defaults for
/// socket/WebRTC sources (FIFO path and container).
pub fn normalize(cfg: &Config, defaults: Defaults, pipes_dir: &Path) -> Result<Config> {
    if cfg.video.is_none() && cfg.audio.is_none() {
        return Err(PipelineError::InvalidConfig(
            "at least one of video or audio must be supplied".to_string(),
        ));
    }

    let width = if cfg.width == 0 { defaults.width } else { cfg.width };
    let height = if cfg.height == 0 { defaults.height } else { cfg.height };
    let frame_rate = if cfg.frame_rate == 0 { defaults.frame_rate } else { cfg.frame_rate };

    let video = cfg.video.as_ref().map(|s| normalize_source(s, true, pipes_dir)).transpose()?;
    let audio = cfg.audio.as_ref().map(|s| normalize_source(s, false, pipes_dir)).transpose()?;

    Ok(Config { video, audio, width, height, frame_rate })
}

fn normalize_source(source: &MediaSource, is_video: bool, pipes_dir: &Path) -> Result<MediaSource> {
    let mut source = source.clone();
    match source.kind {
        SourceKind::File | SourceKind::Stream => {
            if source.url.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} source of kind {:?} requires a url",
                    if is_video { "video" } else { "audio" },
                    source.kind
                )));
            }
        }
        SourceKind::Socket => {
            if source.url.is_empty() {
                source.url = fifo_path(pipes_dir, is_video, "sock");
            }
            if source.container.is_none() {
                source.container = Some(if is_video { "mpegts" } else { "mp3" }.to_string());
            }
        }
        SourceKind::WebRtc => {
            if source.url.is_empty() {
                source.url = fifo_path(pipes_dir, is_video, "fifo");
            }
            if source.container.is_none() {
                source.container = Some(if is_video { "ivf" } else { "ogg" }.to_string());
            }
        }
    }
    Ok(source)
}

fn fifo_path(pipes_dir: &Path, is_video: bool, ext: &str) -> String {
    let name = if is_video { "video" } else { "audio" };
    pipes_dir.join(format!("{name}.{ext}")).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn defaults() -> Defaults {
        Defaults { width: 1280, height: 720, frame_rate: 30 }
    }

    #[test]
    fn rejects_empty_config() {
        let cfg = Config::default();
        let err = normalize(&cfg, defaults(), &PathBuf::from("/tmp/pipes")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn fills_dimension_defaults_when_zero() {
        let cfg = Config {
            video: Some(MediaSource { kind: SourceKind::File, url: "/tmp/a.mp4".into(), r#loop: false, container: None }),
            audio: None,
            width: 0,
            height: 0,
            frame_rate: 0,
        };
        let normalized = normalize(&cfg, defaults(), &PathBuf::from("/tmp/pipes")).unwrap();
        assert_eq!(normalized.width, 1280);
        assert_eq!(normalized.height, 720);
        assert_eq!(normalized.frame_rate, 30);
    }

    #[test]
    fn file_source_without_url_is_rejected() {
        let cfg = Config {
            video: Some(MediaSource { kind: SourceKind::File, url: String::new(), r#loop: false, container: None }),
            audio: None,
            width: 0,
            height: 0,
            frame_rate: 0,
        };
        assert!(normalize(&cfg, defaults(), &PathBuf::from("/tmp/pipes")).is_err());
    }

    #[test]
    fn socket_video_defaults_to_fifo_and_mpegts() {
        let cfg = Config {
            video: Some(MediaSource { kind: SourceKind::Socket, url: String::new(), r#loop: false, container: None }),
            audio: None,
            width: 0,
            height: 0,
            frame_rate: 0,
        };
        let normalized = normalize(&cfg, defaults(), &PathBuf::from("/tmp/pipes")).unwrap();
        let video = normalized.video.unwrap();
        assert_eq!(video.url, "/tmp/pipes/video.sock");
        assert_eq!(video.container.as_deref(), Some("mpegts"));
    }

    #[test]
    fn webrtc_audio_defaults_to_fifo_and_ogg() {
        let cfg = Config {
            video: None,
            audio: Some(MediaSource { kind: SourceKind::WebRtc, url: String::new(), r#loop: false, container: None }),
            width: 0,
            height: 0,
            frame_rate: 0,
        };
        let normalized = normalize(&cfg, defaults(), &PathBuf::from("/tmp/pipes")).unwrap();
        let audio = normalized.audio.unwrap();
        assert_eq!(audio.url, "/tmp/pipes/audio.fifo");
        assert_eq!(audio.container.as_deref(), Some("ogg"));
    }
}
