pub mod error;
pub mod http;
pub mod rewrite;
pub mod target;
pub mod ws;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::Router;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use error::ProxyError;
pub use target::ProxyTarget;

/// Lock-free counters for the proxy's own upgrade traffic, mirroring the
/// teacher's `web::AppState` metrics-atomics pattern.
#[derive(Debug, Default)]
pub struct Metrics {
    pub upgrade_attempts: AtomicU64,
    pub upgrade_connected: AtomicU64,
    pub upgrade_refused: AtomicU64,
    pub upstream_unreachable: AtomicU64,
}

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub target: Arc<ProxyTarget>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(target: ProxyTarget) -> Self {
        Self { client: reqwest::Client::new(), target: Arc::new(target), metrics: Arc::new(Metrics::default()) }
    }
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    uri: axum::http::Uri,
) -> axum::response::Response {
    let path = uri.to_string();
    state.metrics.upgrade_attempts.fetch_add(1, Ordering::Relaxed);
    match ws::dial_upstream(&state.target, &path).await {
        ws::UpstreamDial::Connected(upstream) => {
            state.metrics.upgrade_connected.fetch_add(1, Ordering::Relaxed);
            ws.on_upgrade(move |socket| async move {
                ws::pump(socket, upstream).await;
            })
            .into_response()
        }
        ws::UpstreamDial::Refused { status, headers } => {
            state.metrics.upgrade_refused.fetch_add(1, Ordering::Relaxed);
            let mut response = status.into_response();
            *response.headers_mut() = headers;
            response
        }
        ws::UpstreamDial::Unreachable => {
            state.metrics.upstream_unreachable.fetch_add(1, Ordering::Relaxed);
            (axum::http::StatusCode::BAD_GATEWAY, "upstream unreachable").into_response()
        }
    }
}

/// Build the full CDP proxy router: discovery rewriting, WebSocket pumping,
/// and an opaque fallback for everything else.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/json", get(http::discovery_handler))
        .route("/json/list", get(http::discovery_handler))
        .route("/json/version", get(http::discovery_handler))
        .route("/", any(ws_upgrade_handler))
        .route("/devtools/{*rest}", any(ws_upgrade_handler))
        .fallback(http::opaque_proxy_handler)
        .with_state(state)
}
