//! Shared application state, modeled on the teacher's `web::AppState`:
//! one struct per subsystem plus lock-free metrics counters.

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use vw_cdp_proxy::{AppState as CdpState, ProxyTarget};
use vw_extension_installer::InstallerConfig;
use vw_fspipe::Sink;
use vw_protocol::AppConfig;
use vw_virtual_input::{ManagerConfig, PipelineManager};

/// Counters for the extension installer's call-site outcomes. The CDP proxy
/// and virtual input manager track their own metrics on their own handles
/// (`vw_cdp_proxy::AppState::metrics`, `vw_virtual_input::PipelineManager::metrics`);
/// the installer's pipeline functions are free functions, so control-plane
/// records their outcomes here instead (spec §1, SPEC_FULL §C.1).
#[derive(Debug, Default)]
pub struct Metrics {
    pub installs_attempted: AtomicU64,
    pub installs_succeeded: AtomicU64,
    pub installs_timed_out: AtomicU64,
}

pub struct AppState {
    pub config: AppConfig,
    pub cdp: CdpState,
    pub virtual_input: Arc<PipelineManager>,
    pub fspipe: tokio::sync::Mutex<Option<Sink>>,
    pub extension_installer: InstallerConfig,
    pub metrics: Metrics,
}

impl AppState {
    pub async fn build(config: AppConfig, work_dir: PathBuf) -> anyhow::Result<Arc<Self>> {
        let target = ProxyTarget::resolve(&config.cdp, &config.server.bind, config.server.port);
        let cdp = CdpState::new(target);

        let manager_config = ManagerConfig {
            ffmpeg_path: config.virtual_input.ffmpeg_path.clone(),
            video_device: config.virtual_input.video_device.clone(),
            pulse_sink: config.virtual_input.pulse_sink.clone(),
            pulse_source: config.virtual_input.pulse_source.clone(),
            pipes_dir: PathBuf::from(&config.virtual_input.pipes_dir),
            defaults: vw_virtual_input::config::Defaults {
                width: config.virtual_input.default_width,
                height: config.virtual_input.default_height,
                frame_rate: config.virtual_input.default_frame_rate,
            },
        };
        let scale_to_zero: Arc<dyn vw_virtual_input::scale_to_zero::ScaleToZeroController> =
            Arc::new(vw_virtual_input::scale_to_zero::NoopController);
        let virtual_input = Arc::new(PipelineManager::new(manager_config, scale_to_zero));

        let fspipe = Sink::start(&config.fspipe).await?;

        let extension_installer = InstallerConfig {
            repo_dir: PathBuf::from(&config.extensions.repo_dir),
            public_base_url: config.extensions.public_base_url.clone(),
            policy_dir: PathBuf::from(&config.extensions.policy_dir),
            keystore_dir: PathBuf::from(&config.extensions.keystore_dir),
            chromium_path: config.extensions.chromium_path.clone(),
            chromium_user: config.extensions.chromium_user.clone(),
            work_dir,
        };

        Ok(Arc::new(Self {
            config,
            cdp,
            virtual_input,
            fspipe: tokio::sync::Mutex::new(Some(fspipe)),
            extension_installer,
            metrics: Metrics::default(),
        }))
    }

    /// Stop every subsystem for graceful shutdown (SPEC_FULL §C.2).
    pub async fn shutdown(&self) {
        tracing::info!("stopping virtual input pipeline");
        self.virtual_input.stop().await;

        if let Some(sink) = self.fspipe.lock().await.take() {
            tracing::info!("closing fspipe transport");
            sink.close().await;
        }
    }
}
