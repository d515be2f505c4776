//! WebRTC ingest subcomponent: accepts an SDP offer, receives VP8/VP9 video
//! and Opus audio, and writes them into the configured socket/webrtc FIFOs
//! as IVF and Ogg respectively (spec §4.2, "WebRTC ingest subcomponent").

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8, MIME_TYPE_VP9};
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::track::track_remote::TrackRemote;

use crate::containers::ivf::{IvfCodec, IvfWriter};
use crate::containers::ogg::OggOpusWriter;
use crate::error::{PipelineError, Result};
use crate::fifo;

/// Where ingested media is written, and at what resolution the IVF header
/// should advertise.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub video_fifo: Option<PathBuf>,
    pub audio_fifo: Option<PathBuf>,
    pub video_width: u16,
    pub video_height: u16,
}

/// A tee sink for observability: every frame/packet written to a FIFO is
/// also handed to this writer, best-effort.
pub type TeeWriter = Arc<Mutex<dyn AsyncWrite + Send + Unpin>>;

pub struct WebRtcIngest {
    peer_connection: Arc<RTCPeerConnection>,
    video_task: Option<JoinHandle<()>>,
    audio_task: Option<JoinHandle<()>>,
}

impl WebRtcIngest {
    /// Negotiate a new peer connection from a browser-style SDP offer,
    /// returning the ingest handle plus the SDP answer to send back.
    pub async fn accept_offer(
        offer_sdp: &str,
        config: IngestConfig,
        video_tee: Option<TeeWriter>,
        audio_tee: Option<TeeWriter>,
    ) -> Result<(Self, String)> {
        let mut media_engine = MediaEngine::default();
        for (mime, clock_rate) in [(MIME_TYPE_VP8, 90_000), (MIME_TYPE_VP9, 90_000)] {
            media_engine
                .register_codec(
                    RTCRtpCodecParameters {
                        capability: RTCRtpCodecCapability {
                            mime_type: mime.to_string(),
                            clock_rate,
                            channels: 0,
                            sdp_fmtp_line: String::new(),
                            rtcp_feedback: vec![],
                        },
                        payload_type: 0,
                        ..Default::default()
                    },
                    RTPCodecType::Video,
                )
                .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        }
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_OPUS.to_string(),
                        clock_rate: 48_000,
                        channels: 2,
                        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
                        rtcp_feedback: vec![],
                    },
                    payload_type: 0,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let api = APIBuilder::new().with_media_engine(media_engine).with_interceptor_registry(registry).build();

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?,
        );

        let video_task: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
        let audio_task: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));

        {
            let video_task = video_task.clone();
            let audio_task = audio_task.clone();
            let config = config.clone();
            peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
                let video_task = video_task.clone();
                let audio_task = audio_task.clone();
                let config = config.clone();
                let video_tee = video_tee.clone();
                let audio_tee = audio_tee.clone();
                Box::pin(async move {
                    match track.kind() {
                        RTPCodecType::Video => {
                            if let Some(path) = config.video_fifo.clone() {
                                let handle = tokio::spawn(run_video_ingest(track, path, config.video_width, config.video_height, video_tee));
                                *video_task.lock().await = Some(handle);
                            }
                        }
                        RTPCodecType::Audio => {
                            if let Some(path) = config.audio_fifo.clone() {
                                let handle = tokio::spawn(run_audio_ingest(track, path, audio_tee));
                                *audio_task.lock().await = Some(handle);
                            }
                        }
                        _ => {}
                    }
                })
            }));
        }

        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        peer_connection.set_remote_description(offer).await.map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let answer = peer_connection.create_answer(None).await.map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        let mut gather_complete = peer_connection.gathering_complete_promise().await;
        peer_connection.set_local_description(answer).await.map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        let _ = gather_complete.recv().await;

        let local_desc = peer_connection
            .local_description()
            .await
            .ok_or_else(|| PipelineError::InvalidConfig("no local description after gathering".to_string()))?;

        let video_task = video_task.lock().await.take();
        let audio_task = audio_task.lock().await.take();

        Ok((Self { peer_connection, video_task, audio_task }, local_desc.sdp))
    }

    /// Tear down the peer connection and cancel both forwarder tasks.
    pub async fn close(self) {
        if let Some(task) = self.video_task {
            task.abort();
        }
        if let Some(task) = self.audio_task {
            task.abort();
        }
        let _ = self.peer_connection.close().await;
    }
}

async fn run_video_ingest(
    track: Arc<TrackRemote>,
    fifo_path: PathBuf,
    width: u16,
    height: u16,
    tee: Option<TeeWriter>,
) {
    let path_str = fifo_path.to_string_lossy().into_owned();
    let file = match fifo::open_writer(&path_str, std::time::Duration::from_secs(30)).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path_str, error = %e, "failed to open video FIFO for WebRTC ingest");
            return;
        }
    };
    let codec = if track.codec().capability.mime_type.eq_ignore_ascii_case(MIME_TYPE_VP9) {
        IvfCodec::Vp9
    } else {
        IvfCodec::Vp8
    };
    let mut writer = IvfWriter::new(file, codec, width, height);

    loop {
        let (packet, _attrs) = match track.read_rtp().await {
            Ok(p) => p,
            Err(_) => break,
        };
        if let Some(tee) = &tee {
            use tokio::io::AsyncWriteExt;
            let _ = tee.lock().await.write_all(&packet.payload).await;
        }
        if writer.write_frame(&packet.payload, u64::from(packet.header.timestamp)).await.is_err() {
            break;
        }
    }
}

async fn run_audio_ingest(track: Arc<TrackRemote>, fifo_path: PathBuf, tee: Option<TeeWriter>) {
    let path_str = fifo_path.to_string_lossy().into_owned();
    let file = match fifo::open_writer(&path_str, std::time::Duration::from_secs(30)).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path_str, error = %e, "failed to open audio FIFO for WebRTC ingest");
            return;
        }
    };
    let mut writer = OggOpusWriter::new(file, 1, 2, 48_000);

    loop {
        let (packet, _attrs) = match track.read_rtp().await {
            Ok(p) => p,
            Err(_) => break,
        };
        if let Some(tee) = &tee {
            use tokio::io::AsyncWriteExt;
            let _ = tee.lock().await.write_all(&packet.payload).await;
        }
        // 20ms frames at 48kHz is the overwhelmingly common Opus packetization.
        if writer.write_packet(&packet.payload, 960, 2, 48_000).await.is_err() {
            break;
        }
    }
    let _ = writer.finish().await;
}
