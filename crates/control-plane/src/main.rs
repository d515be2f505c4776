mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use state::AppState;

fn parse_args() -> (PathBuf, Option<u16>) {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = PathBuf::from("./config/vw.toml");
    let mut port_override = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port_override = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    (config_path, port_override)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (config_path, port_override) = parse_args();

    let mut config = vw_protocol::load_config(&config_path)?;
    if let Some(p) = port_override {
        config.server.port = p;
    }

    if let Err(issues) = config.validate() {
        let has_errors = issues.iter().any(|i| i.starts_with("ERROR:"));
        for issue in &issues {
            if issue.starts_with("ERROR:") {
                tracing::error!("{issue}");
            } else {
                tracing::warn!("{issue}");
            }
        }
        if has_errors {
            tracing::error!("Configuration has {} issue(s). Fix the ERROR(s) above and restart.", issues.len());
            std::process::exit(1);
        }
    }

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let work_dir = std::env::temp_dir().join("vw-extension-installer");
    tokio::fs::create_dir_all(&work_dir).await.ok();

    let state = AppState::build(config, work_dir).await.context("failed to build application state")?;

    let subsystem_routes = axum::Router::new()
        .nest("/virtual-input", routes::virtual_input_router())
        .merge(routes::extensions_router())
        .with_state(state.clone());

    let app = axum::Router::new()
        .merge(vw_cdp_proxy::router(state.cdp.clone()))
        .merge(subsystem_routes)
        .layer(TraceLayer::new_for_http());

    tracing::info!("===========================================");
    tracing::info!("  Virtual workspace control plane");
    tracing::info!("  Listening on http://{bind_addr}");
    tracing::info!("===========================================");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    tracing::info!("control plane ready, accepting connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("server error")?;

    tracing::info!("control plane shut down cleanly");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received ctrl-c, initiating graceful shutdown");
    state.shutdown().await;
}
