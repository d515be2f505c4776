//! Top-level pipeline manager: the single entry point that serializes state
//! transitions and owns the current ffmpeg child, if any (spec §4.2).

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;
use vw_protocol::virtual_input::{Config, ManagerState, SourceKind, Status};

use crate::config::{self, Defaults};
use crate::device;
use crate::error::{PipelineError, Result};
use crate::ffmpeg_args::build_args;
use crate::process::Supervised;
use crate::scale_to_zero::{ScaleToZeroController, ScaleToZeroGuard};
use crate::webrtc_ingest::{IngestConfig, WebRtcIngest};

/// How often the per-child watcher polls for exit. Non-blocking so it never
/// holds the manager mutex for longer than a single `try_wait`.
const WATCHER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Static manager configuration: device paths, binary location, defaults.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub ffmpeg_path: String,
    pub video_device: String,
    pub pulse_sink: String,
    pub pulse_source: String,
    pub pipes_dir: PathBuf,
    pub defaults: Defaults,
}

struct Inner {
    state: ManagerState,
    child: Option<Supervised>,
    effective_config: Option<Config>,
    started_at: Option<SystemTime>,
    last_error: Option<String>,
    /// Bumped on every transition that replaces or removes the current
    /// child, so a stale watcher (from a child that has since been
    /// stopped/replaced) recognizes it has nothing left to report.
    generation: u64,
    /// At most one active WebRTC ingest connection per manager. Replacing
    /// the config, or accepting a new offer, tears down whatever is here
    /// first.
    webrtc_ingest: Option<WebRtcIngest>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: ManagerState::Idle,
            child: None,
            effective_config: None,
            started_at: None,
            last_error: None,
            generation: 0,
            webrtc_ingest: None,
        }
    }
}

/// Lock-free call counters, mirroring the teacher's `web::AppState`
/// metrics-atomics pattern.
#[derive(Debug, Default)]
pub struct Metrics {
    pub configure_calls: AtomicU64,
    pub pause_calls: AtomicU64,
    pub resume_calls: AtomicU64,
    pub stop_calls: AtomicU64,
    pub ffmpeg_restarts: AtomicU64,
}

/// Serializes every state transition behind one mutex. A dedicated polling
/// watcher task is spawned per running child and exits as soon as the child
/// exits or a newer generation supersedes it.
pub struct PipelineManager {
    config: ManagerConfig,
    inner: Mutex<Inner>,
    scale_to_zero: ScaleToZeroGuard,
    pub metrics: Metrics,
}

impl PipelineManager {
    pub fn new(config: ManagerConfig, scale_to_zero: Arc<dyn ScaleToZeroController>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            scale_to_zero: ScaleToZeroGuard::new(scale_to_zero),
            metrics: Metrics::default(),
        }
    }

    pub async fn status(&self) -> Status {
        let inner = self.inner.lock().await;
        self.snapshot(&inner)
    }

    /// Configure (or reconfigure) the pipeline. Idempotent with respect to
    /// the terminal state it lands in: stops whatever is currently running
    /// before starting the new one.
    pub async fn configure(self: &Arc<Self>, cfg: Config, start_paused: bool) -> Result<Status> {
        self.metrics.configure_calls.fetch_add(1, Ordering::Relaxed);
        let normalized = config::normalize(&cfg, self.config.defaults, &self.config.pipes_dir)?;

        let mut inner = self.inner.lock().await;
        self.stop_current(&mut inner).await;
        self.start(&mut inner, normalized, start_paused).await?;
        let status = self.snapshot(&inner);
        let generation = inner.generation;
        drop(inner);
        self.clone().spawn_child_watcher(generation);
        Ok(status)
    }

    pub async fn pause(self: &Arc<Self>) -> Result<Status> {
        self.metrics.pause_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().await;
        if inner.state != ManagerState::Running {
            return Err(PipelineError::InvalidState(inner.state));
        }
        let cfg = inner.effective_config.clone().expect("running state always has a config");
        self.stop_current(&mut inner).await;
        self.start(&mut inner, cfg, true).await?;
        let status = self.snapshot(&inner);
        let generation = inner.generation;
        drop(inner);
        self.clone().spawn_child_watcher(generation);
        Ok(status)
    }

    pub async fn resume(self: &Arc<Self>) -> Result<Status> {
        self.metrics.resume_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().await;
        if inner.state != ManagerState::Paused {
            return Err(PipelineError::InvalidState(inner.state));
        }
        let cfg = inner.effective_config.clone().expect("paused state always has a config");
        self.stop_current(&mut inner).await;
        self.start(&mut inner, cfg, false).await?;
        let status = self.snapshot(&inner);
        let generation = inner.generation;
        drop(inner);
        self.clone().spawn_child_watcher(generation);
        Ok(status)
    }

    pub async fn stop(self: &Arc<Self>) -> Status {
        self.metrics.stop_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().await;
        self.stop_current(&mut inner).await;
        inner.effective_config = None;
        inner.last_error = None;
        self.snapshot(&inner)
    }

    /// Accept a WebRTC offer against the currently configured webrtc
    /// source(s), returning the SDP answer. Any previously accepted
    /// connection is closed first — the manager holds at most one at a time.
    pub async fn accept_webrtc_offer(&self, offer_sdp: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let cfg = inner.effective_config.clone().ok_or(PipelineError::InvalidState(inner.state))?;

        let video_fifo =
            cfg.video.as_ref().filter(|s| s.kind == SourceKind::WebRtc).map(|s| PathBuf::from(&s.url));
        let audio_fifo =
            cfg.audio.as_ref().filter(|s| s.kind == SourceKind::WebRtc).map(|s| PathBuf::from(&s.url));
        if video_fifo.is_none() && audio_fifo.is_none() {
            return Err(PipelineError::InvalidConfig("no webrtc source is configured".to_string()));
        }

        let ingest_config =
            IngestConfig { video_fifo, audio_fifo, video_width: cfg.width as u16, video_height: cfg.height as u16 };

        if let Some(previous) = inner.webrtc_ingest.take() {
            previous.close().await;
        }

        let (ingest, answer_sdp) = WebRtcIngest::accept_offer(offer_sdp, ingest_config, None, None).await?;
        inner.webrtc_ingest = Some(ingest);
        Ok(answer_sdp)
    }

    fn snapshot(&self, inner: &Inner) -> Status {
        Status {
            state: inner.state,
            video_device: inner.effective_config.as_ref().and(Some(self.config.video_device.clone())),
            audio_sink: inner.effective_config.as_ref().and(Some(self.config.pulse_sink.clone())),
            effective_config: inner.effective_config.clone(),
            started_at: inner.started_at,
            last_error: inner.last_error.clone(),
        }
    }

    /// Stop whatever is currently running (no-op if already idle) and bump
    /// the generation counter so any watcher still polling the old child
    /// recognizes itself as stale.
    async fn stop_current(&self, inner: &mut Inner) {
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(child) = inner.child.take() {
            child.stop().await;
        }
        if let Some(ingest) = inner.webrtc_ingest.take() {
            ingest.close().await;
        }
        if inner.state != ManagerState::Idle {
            self.scale_to_zero.enable_once().await;
        }
        inner.state = ManagerState::Idle;
        inner.started_at = None;
    }

    async fn start(&self, inner: &mut Inner, cfg: Config, start_paused: bool) -> Result<()> {
        if cfg.video.is_some() {
            device::ensure_video_device(&self.config.video_device).await?;
        }
        if cfg.audio.is_some() {
            if device::verify_pulse_sink(&self.config.pulse_sink).await.is_err() {
                tracing::warn!(sink = %self.config.pulse_sink, "configured pulse sink not found");
            }
            if device::verify_pulse_source(&self.config.pulse_source).await.is_err() {
                tracing::warn!(source = %self.config.pulse_source, "configured pulse source not found");
            }
        }

        self.scale_to_zero.disable().await;

        let plan = build_args(&cfg, start_paused, &self.config.video_device, &self.config.pulse_sink);
        let child = Supervised::spawn(&self.config.ffmpeg_path, &plan.args).await?;

        inner.generation = inner.generation.wrapping_add(1);
        inner.child = Some(child);
        inner.effective_config = Some(cfg);
        inner.state = if start_paused { ManagerState::Paused } else { ManagerState::Running };
        inner.started_at = Some(SystemTime::now());
        inner.last_error = None;
        Ok(())
    }

    /// Poll the child tagged with `generation` until it exits or a newer
    /// generation replaces it. Never holds the mutex across a sleep.
    fn spawn_child_watcher(self: Arc<Self>, generation: u64) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(WATCHER_POLL_INTERVAL).await;

                let mut inner = self.inner.lock().await;
                if inner.generation != generation {
                    return;
                }
                let exited = match inner.child.as_mut() {
                    Some(child) => child.try_wait(),
                    None => return,
                };

                match exited {
                    Ok(None) => continue,
                    Ok(Some(status)) => {
                        let stderr_tail = inner.child.as_ref().map(Supervised::stderr_tail).unwrap_or_default();
                        inner.child = None;
                        if !status.success() {
                            inner.last_error = Some(format!("ffmpeg exited with {status}: {stderr_tail}"));
                            self.metrics.ffmpeg_restarts.fetch_add(1, Ordering::Relaxed);
                        }
                        inner.state = ManagerState::Idle;
                        inner.started_at = None;
                        drop(inner);
                        self.scale_to_zero.enable_once().await;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to poll ffmpeg child status");
                        return;
                    }
                }
            }
        });
    }
}
