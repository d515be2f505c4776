#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[from] reqwest::Error),
    #[error("upstream WebSocket dial failed: {0}")]
    UpstreamWsDial(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("upstream returned malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
}
