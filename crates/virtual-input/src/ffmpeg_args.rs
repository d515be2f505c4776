//! FFmpeg argument construction (spec §4.2, "FFmpeg argument construction").

use vw_protocol::virtual_input::{Config, MediaSource, SourceKind};

/// A fully built FFmpeg invocation: ordered arguments plus which input index
/// carries video and which carries audio. Both indexes also drive the
/// explicit `-map` selectors baked into `args` itself, so a shared-source
/// input (video and audio reading the same URL) ends up mapped from the one
/// input index it was given instead of being read twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegPlan {
    pub args: Vec<String>,
    pub video_input_index: Option<usize>,
    pub audio_input_index: Option<usize>,
}

/// Build the full ordered argument list for one pipeline run.
///
/// `paused` substitutes lavfi black-frame/silence sources for any source the
/// effective config doesn't itself replace, so the devices keep producing
/// valid frames instead of going quiet.
pub fn build_args(cfg: &Config, paused: bool, video_device: &str, pulse_sink: &str) -> FfmpegPlan {
    let mut args = vec!["-hide_banner".to_string(), "-loglevel".to_string(), "error".to_string(), "-nostdin".to_string()];
    let mut video_input_index = None;
    let mut audio_input_index = None;
    let mut input_index = 0usize;

    if paused {
        args.push("-f".to_string());
        args.push("lavfi".to_string());
        args.push("-i".to_string());
        args.push(format!(
            "color=c=black:s={}x{}:r={}",
            cfg.width, cfg.height, cfg.frame_rate
        ));
        video_input_index = Some(input_index);
        input_index += 1;

        args.push("-f".to_string());
        args.push("lavfi".to_string());
        args.push("-i".to_string());
        args.push("anullsrc=channel_layout=stereo:sample_rate=48000".to_string());
        audio_input_index = Some(input_index);
        input_index += 1;
    } else {
        // A source that shares a single URL (and kind, and loop flag) for
        // both legs must become exactly one input, with both maps pointing
        // at it, rather than two FFmpeg inputs reading the same thing twice.
        let shares_one_input = match (&cfg.video, &cfg.audio) {
            (Some(video), Some(audio)) => {
                video.url == audio.url && video.kind == audio.kind && video.r#loop == audio.r#loop
            }
            _ => false,
        };

        if shares_one_input {
            let video = cfg.video.as_ref().unwrap();
            let audio = cfg.audio.as_ref().unwrap();
            let mut combined = video.clone();
            if combined.container.is_none() {
                combined.container = audio.container.clone();
            }
            push_input(&mut args, &combined);
            video_input_index = Some(input_index);
            audio_input_index = Some(input_index);
            input_index += 1;
        } else {
            if let Some(video) = &cfg.video {
                push_input(&mut args, video);
                video_input_index = Some(input_index);
                input_index += 1;
            }
            if let Some(audio) = &cfg.audio {
                push_input(&mut args, audio);
                audio_input_index = Some(input_index);
                input_index += 1;
            }
        }
    }

    if let Some(idx) = video_input_index {
        args.push("-map".to_string());
        args.push(format!("{idx}:v"));
        args.push("-vf".to_string());
        args.push(format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = cfg.width,
            h = cfg.height
        ));
        args.push("-pix_fmt".to_string());
        args.push("yuv420p".to_string());
        args.push("-r".to_string());
        args.push(cfg.frame_rate.to_string());
        args.push("-f".to_string());
        args.push("v4l2".to_string());
        args.push(video_device.to_string());
    }

    if let Some(idx) = audio_input_index {
        args.push("-map".to_string());
        args.push(format!("{idx}:a"));
        args.push("-ar".to_string());
        args.push("48000".to_string());
        args.push("-ac".to_string());
        args.push("2".to_string());
        args.push("-f".to_string());
        args.push("pulse".to_string());
        args.push(pulse_sink.to_string());
    }

    FfmpegPlan { args, video_input_index, audio_input_index }
}

fn push_input(args: &mut Vec<String>, source: &MediaSource) {
    match source.kind {
        SourceKind::Stream => {
            args.push("-reconnect".to_string());
            args.push("1".to_string());
            args.push("-reconnect_streamed".to_string());
            args.push("1".to_string());
            args.push("-reconnect_delay_max".to_string());
            args.push("2".to_string());
        }
        SourceKind::File => {
            args.push("-re".to_string());
            if source.r#loop {
                args.push("-stream_loop".to_string());
                args.push("-1".to_string());
            }
        }
        SourceKind::Socket | SourceKind::WebRtc => {}
    }

    if let Some(container) = &source.container {
        args.push("-f".to_string());
        args.push(container.clone());
    }

    args.push("-i".to_string());
    args.push(source.url.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use vw_protocol::virtual_input::Config;

    fn base_cfg() -> Config {
        Config {
            video: Some(MediaSource { kind: SourceKind::File, url: "/tmp/clip.mp4".into(), r#loop: false, container: None }),
            audio: None,
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }

    #[test]
    fn file_source_gets_dash_re() {
        let plan = build_args(&base_cfg(), false, "/dev/video20", "virtual_speaker");
        assert!(plan.args.iter().any(|a| a == "-re"));
        assert_eq!(plan.video_input_index, Some(0));
        assert_eq!(plan.audio_input_index, None);
    }

    #[test]
    fn video_output_has_scale_and_device() {
        let plan = build_args(&base_cfg(), false, "/dev/video20", "virtual_speaker");
        assert!(plan.args.iter().any(|a| a.starts_with("scale=1280:720")));
        assert!(plan.args.windows(2).any(|w| w[0] == "-f" && w[1] == "v4l2"));
        assert_eq!(plan.args.last().unwrap(), "/dev/video20");
    }

    #[test]
    fn paused_uses_lavfi_for_both_legs() {
        let mut cfg = base_cfg();
        cfg.audio = Some(MediaSource { kind: SourceKind::File, url: "/tmp/a.mp3".into(), r#loop: false, container: None });
        let plan = build_args(&cfg, true, "/dev/video20", "virtual_speaker");
        assert_eq!(plan.video_input_index, Some(0));
        assert_eq!(plan.audio_input_index, Some(1));
        assert!(plan.args.iter().any(|a| a.starts_with("color=c=black")));
        assert!(plan.args.iter().any(|a| a.starts_with("anullsrc")));
        // paused mode never references the file urls
        assert!(!plan.args.iter().any(|a| a.contains("/tmp/clip.mp4")));
    }

    #[test]
    fn stream_source_enables_reconnect() {
        let mut cfg = base_cfg();
        cfg.video = Some(MediaSource { kind: SourceKind::Stream, url: "rtmp://host/live".into(), r#loop: false, container: None });
        let plan = build_args(&cfg, false, "/dev/video20", "virtual_speaker");
        assert!(plan.args.iter().any(|a| a == "-reconnect"));
    }

    #[test]
    fn shared_url_video_and_audio_collapse_to_one_input_with_explicit_maps() {
        let mut cfg = base_cfg();
        cfg.video = Some(MediaSource {
            kind: SourceKind::Stream,
            url: "rtmp://host/live".into(),
            r#loop: false,
            container: None,
        });
        cfg.audio = Some(MediaSource {
            kind: SourceKind::Stream,
            url: "rtmp://host/live".into(),
            r#loop: false,
            container: None,
        });
        let plan = build_args(&cfg, false, "/dev/video20", "virtual_speaker");

        assert_eq!(plan.video_input_index, Some(0));
        assert_eq!(plan.audio_input_index, Some(0));
        assert_eq!(plan.args.iter().filter(|a| *a == "-i").count(), 1, "expected exactly one input");
        assert!(plan.args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:v"));
        assert!(plan.args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a"));
    }

    #[test]
    fn distinct_sources_each_get_their_own_input_and_map() {
        let mut cfg = base_cfg();
        cfg.audio = Some(MediaSource { kind: SourceKind::File, url: "/tmp/a.mp3".into(), r#loop: false, container: None });
        let plan = build_args(&cfg, false, "/dev/video20", "virtual_speaker");

        assert_eq!(plan.video_input_index, Some(0));
        assert_eq!(plan.audio_input_index, Some(1));
        assert_eq!(plan.args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(plan.args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:v"));
        assert!(plan.args.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a"));
    }
}
