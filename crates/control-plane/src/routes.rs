//! HTTP routes for the virtual input manager and the extension installer,
//! mounted alongside the CDP proxy's own router.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use vw_extension_installer::{install_from_github, install_from_upload, resolve_repo_path, DevtoolsTarget};
use vw_protocol::virtual_input::Config;

use crate::state::AppState;

pub fn virtual_input_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(status))
        .route("/configure", post(configure))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/stop", post(stop))
        .route("/webrtc/offer", post(webrtc_offer))
}

pub fn extensions_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/install/github", post(install_github))
        .route("/install/upload", post(install_upload))
        .route("/extrepo/{*path}", get(serve_repo_file))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<vw_protocol::virtual_input::Status> {
    Json(state.virtual_input.status().await)
}

#[derive(Debug, Deserialize)]
struct ConfigureRequest {
    #[serde(flatten)]
    config: Config,
    #[serde(default)]
    start_paused: bool,
}

async fn configure(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<vw_protocol::virtual_input::Status>, ApiError> {
    let status = state.virtual_input.configure(request.config, request.start_paused).await?;
    Ok(Json(status))
}

async fn pause(State(state): State<Arc<AppState>>) -> Result<Json<vw_protocol::virtual_input::Status>, ApiError> {
    Ok(Json(state.virtual_input.pause().await?))
}

async fn resume(State(state): State<Arc<AppState>>) -> Result<Json<vw_protocol::virtual_input::Status>, ApiError> {
    Ok(Json(state.virtual_input.resume().await?))
}

async fn stop(State(state): State<Arc<AppState>>) -> Json<vw_protocol::virtual_input::Status> {
    Json(state.virtual_input.stop().await)
}

#[derive(Debug, Deserialize)]
struct WebrtcOfferRequest {
    sdp: String,
}

#[derive(Debug, serde::Serialize)]
struct WebrtcAnswerResponse {
    sdp: String,
}

async fn webrtc_offer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WebrtcOfferRequest>,
) -> Result<Json<WebrtcAnswerResponse>, ApiError> {
    let sdp = state.virtual_input.accept_webrtc_offer(&request.sdp).await?;
    Ok(Json(WebrtcAnswerResponse { sdp }))
}

#[derive(Debug, Deserialize)]
struct InstallGithubRequest {
    url: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    devtools_http_base: Option<String>,
}

async fn install_github(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InstallGithubRequest>,
) -> Result<Json<vw_protocol::extension::ExtensionArtifact>, ApiError> {
    state.metrics.installs_attempted.fetch_add(1, Ordering::Relaxed);
    let devtools = request.devtools_http_base.as_ref().map(|base| DevtoolsTarget {
        http_base: base.clone(),
        profile_extensions_dir: default_profile_extensions_dir(&state),
        install_timeout: Duration::from_millis(state.config.extensions.install_timeout_ms),
    });
    let artifact =
        install_from_github(&state.extension_installer, request.url, request.branch, devtools.as_ref()).await?;
    record_install_outcome(&state, &artifact);
    Ok(Json(artifact))
}

#[derive(Debug, Deserialize)]
struct InstallUploadRequest {
    manifest_name: String,
    /// Base64-encoded zip archive; JSON has no native byte-string type.
    archive_base64: String,
    #[serde(default)]
    devtools_http_base: Option<String>,
}

async fn install_upload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InstallUploadRequest>,
) -> Result<Json<vw_protocol::extension::ExtensionArtifact>, ApiError> {
    use base64::Engine;
    state.metrics.installs_attempted.fetch_add(1, Ordering::Relaxed);
    let archive_bytes = base64::engine::general_purpose::STANDARD
        .decode(&request.archive_base64)
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("invalid base64: {e}")))?;
    let devtools = request.devtools_http_base.as_ref().map(|base| DevtoolsTarget {
        http_base: base.clone(),
        profile_extensions_dir: default_profile_extensions_dir(&state),
        install_timeout: Duration::from_millis(state.config.extensions.install_timeout_ms),
    });
    let artifact =
        install_from_upload(&state.extension_installer, request.manifest_name, &archive_bytes, devtools.as_ref())
            .await?;
    record_install_outcome(&state, &artifact);
    Ok(Json(artifact))
}

fn record_install_outcome(state: &AppState, artifact: &vw_protocol::extension::ExtensionArtifact) {
    if artifact.installed {
        state.metrics.installs_succeeded.fetch_add(1, Ordering::Relaxed);
    } else {
        state.metrics.installs_timed_out.fetch_add(1, Ordering::Relaxed);
    }
}

fn default_profile_extensions_dir(state: &AppState) -> std::path::PathBuf {
    let home = state.config.extensions.chromium_user.as_deref().unwrap_or("/root");
    vw_extension_installer::devtools::default_profile_extensions_dir(home)
}

async fn serve_repo_file(
    State(state): State<Arc<AppState>>,
    AxumPath(path): AxumPath<String>,
) -> Result<Vec<u8>, ApiError> {
    let resolved = resolve_repo_path(&state.extension_installer.repo_dir, &path)
        .ok_or_else(|| ApiError(StatusCode::FORBIDDEN, "path escapes the extension repository".to_string()))?;
    tokio::fs::read(&resolved)
        .await
        .map_err(|e| ApiError(StatusCode::NOT_FOUND, format!("{e}")))
}

/// Uniform HTTP error response for the routes above.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.0, self.1).into_response()
    }
}

impl From<vw_virtual_input::PipelineError> for ApiError {
    fn from(err: vw_virtual_input::PipelineError) -> Self {
        ApiError(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<vw_extension_installer::InstallError> for ApiError {
    fn from(err: vw_extension_installer::InstallError) -> Self {
        ApiError(StatusCode::BAD_GATEWAY, err.to_string())
    }
}
