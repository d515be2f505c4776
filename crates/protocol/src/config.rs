//! Top-level control-plane configuration, loaded from a TOML file.
//!
//! Modeled directly on the teacher's `BeamConfig`: every section has
//! `#[serde(default)]` so a missing or partial file still produces a usable
//! configuration, and `validate()` returns a flat list of `ERROR:`/`WARNING:`
//! prefixed issues rather than failing fast on the first one.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cdp: CdpConfig,
    #[serde(default)]
    pub virtual_input: VirtualInputConfig,
    #[serde(default)]
    pub fspipe: FspipeConfig,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpConfig {
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,
    #[serde(default = "default_upstream_port")]
    pub upstream_port: u16,
    /// Host:port external clients are told to connect to. Defaults to
    /// `server.bind:server.port` when unset at validation time.
    pub advertised_host: Option<String>,
    pub advertised_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualInputConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_video_device")]
    pub video_device: String,
    #[serde(default = "default_pulse_sink")]
    pub pulse_sink: String,
    #[serde(default = "default_pulse_source")]
    pub pulse_source: String,
    #[serde(default = "default_pipes_dir")]
    pub pipes_dir: String,
    #[serde(default = "default_width")]
    pub default_width: u32,
    #[serde(default = "default_height")]
    pub default_height: u32,
    #[serde(default = "default_frame_rate")]
    pub default_frame_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FspipeBackend {
    Tcp,
    WebSocket,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FspipeConfig {
    #[serde(default = "default_fspipe_backend")]
    pub backend: FspipeBackend,
    #[serde(default = "default_fspipe_bind")]
    pub bind: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub s3_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    #[serde(default = "default_repo_dir")]
    pub repo_dir: String,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_policy_dir")]
    pub policy_dir: String,
    #[serde(default = "default_keystore_dir")]
    pub keystore_dir: String,
    #[serde(default = "default_chromium_path")]
    pub chromium_path: String,
    pub chromium_user: Option<String>,
    #[serde(default = "default_install_timeout_ms")]
    pub install_timeout_ms: u64,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}
fn default_upstream_port() -> u16 {
    9223
}
fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}
fn default_video_device() -> String {
    "/dev/video20".to_string()
}
fn default_pulse_sink() -> String {
    "virtual_speaker".to_string()
}
fn default_pulse_source() -> String {
    "virtual_mic".to_string()
}
fn default_pipes_dir() -> String {
    "/tmp/vw-pipes".to_string()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_frame_rate() -> u32 {
    30
}
fn default_fspipe_backend() -> FspipeBackend {
    FspipeBackend::Tcp
}
fn default_fspipe_bind() -> String {
    "0.0.0.0:9100".to_string()
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_max_retries() -> u32 {
    5
}
fn default_ack_timeout_ms() -> u64 {
    5_000
}
fn default_health_check_interval_ms() -> u64 {
    10_000
}
fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
fn default_repo_dir() -> String {
    "/var/lib/vw/extrepo".to_string()
}
fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/extrepo".to_string()
}
fn default_policy_dir() -> String {
    "/etc/chromium/policies/managed".to_string()
}
fn default_keystore_dir() -> String {
    "/var/lib/vw/keystore".to_string()
}
fn default_chromium_path() -> String {
    "chromium".to_string()
}
fn default_install_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), port: default_port() }
    }
}
impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            upstream_host: default_upstream_host(),
            upstream_port: default_upstream_port(),
            advertised_host: None,
            advertised_port: None,
        }
    }
}
impl Default for VirtualInputConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            video_device: default_video_device(),
            pulse_sink: default_pulse_sink(),
            pulse_source: default_pulse_source(),
            pipes_dir: default_pipes_dir(),
            default_width: default_width(),
            default_height: default_height(),
            default_frame_rate: default_frame_rate(),
        }
    }
}
impl Default for FspipeConfig {
    fn default() -> Self {
        Self {
            backend: default_fspipe_backend(),
            bind: default_fspipe_bind(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            ack_timeout_ms: default_ack_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            s3_prefix: String::new(),
        }
    }
}
impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            repo_dir: default_repo_dir(),
            public_base_url: default_public_base_url(),
            policy_dir: default_policy_dir(),
            keystore_dir: default_keystore_dir(),
            chromium_path: default_chromium_path(),
            chromium_user: None,
            install_timeout_ms: default_install_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cdp: CdpConfig::default(),
            virtual_input: VirtualInputConfig::default(),
            fspipe: FspipeConfig::default(),
            extensions: ExtensionsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate configuration semantics, returning a flat list of issues.
    /// `ERROR:`-prefixed issues are fatal; `WARNING:`-prefixed ones are
    /// advisory. Mirrors the teacher's `BeamConfig::validate()` shape.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push("ERROR: server.port must be between 1 and 65535, got 0.".to_string());
        }

        if self.virtual_input.default_frame_rate == 0 || self.virtual_input.default_frame_rate > 240 {
            issues.push(format!(
                "ERROR: virtual_input.default_frame_rate must be between 1 and 240, got {}.",
                self.virtual_input.default_frame_rate
            ));
        }

        if self.fspipe.backend == FspipeBackend::S3 {
            if self.fspipe.s3_bucket.is_none() {
                issues.push("ERROR: fspipe.backend = \"s3\" requires fspipe.s3_bucket.".to_string());
            }
            if self.fspipe.s3_region.is_none() && self.fspipe.s3_endpoint.is_none() {
                issues.push(
                    "WARNING: fspipe.s3_region is unset and no custom s3_endpoint was given; \
                     relying on the AWS SDK's default region resolution."
                        .to_string(),
                );
            }
        }

        if self.fspipe.queue_capacity == 0 {
            issues.push("ERROR: fspipe.queue_capacity must be greater than 0.".to_string());
        }

        if !std::path::Path::new(&self.extensions.repo_dir).exists() {
            issues.push(format!(
                "WARNING: extensions.repo_dir '{}' does not exist yet; it will be created on first install.",
                self.extensions.repo_dir
            ));
        }

        if issues.iter().any(|i| i.starts_with("ERROR:")) {
            Err(issues)
        } else {
            if !issues.is_empty() {
                return Err(issues);
            }
            Ok(())
        }
    }
}

/// Load configuration from a TOML file. If the file doesn't exist, returns
/// default configuration (mirrors the teacher's `config::load_config`).
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cdp.upstream_port, 9223);
        assert_eq!(config.virtual_input.default_frame_rate, 30);
        assert_eq!(config.fspipe.backend, FspipeBackend::Tcp);
    }

    #[test]
    fn validate_passes_on_defaults_modulo_repo_dir_warning() {
        let config = AppConfig::default();
        let result = config.validate();
        // repo_dir won't exist in a test sandbox -> WARNING only, no ERROR
        if let Err(issues) = &result {
            assert!(!issues.iter().any(|i| i.starts_with("ERROR:")), "{issues:?}");
        }
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        let issues = config.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.contains("server.port")));
    }

    #[test]
    fn validate_requires_bucket_for_s3_backend() {
        let mut config = AppConfig::default();
        config.fspipe.backend = FspipeBackend::S3;
        let issues = config.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.contains("s3_bucket")));
    }
}
