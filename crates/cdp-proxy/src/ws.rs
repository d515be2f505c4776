//! Bidirectional WebSocket frame pumping between a client and the upstream
//! DevTools endpoint (spec §4.1).

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use axum::http::{HeaderMap, StatusCode};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;

use crate::target::ProxyTarget;

/// Outcome of attempting the upstream dial, taken *before* the client
/// connection is upgraded so a refusal can still be reported over plain HTTP
/// (spec §4.1: "Upstream refuses upgrade -> the upgrade response is
/// forwarded verbatim").
pub enum UpstreamDial {
    Connected(
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    ),
    Refused { status: StatusCode, headers: HeaderMap },
    Unreachable,
}

/// Attempt to dial the upstream DevTools WebSocket at `path`, without
/// touching the client connection.
pub async fn dial_upstream(target: &ProxyTarget, path: &str) -> UpstreamDial {
    let upstream_url = format!("{}{path}", target.upstream_base_ws);
    match tokio_tungstenite::connect_async(&upstream_url).await {
        Ok((stream, _response)) => UpstreamDial::Connected(stream),
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            let status =
                StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut headers = HeaderMap::new();
            for (name, value) in response.headers() {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
                    axum::http::HeaderValue::from_bytes(value.as_bytes()),
                ) {
                    headers.insert(name, value);
                }
            }
            UpstreamDial::Refused { status, headers }
        }
        Err(e) => {
            tracing::warn!(upstream_url, error = %e, "CDP upstream WebSocket dial failed");
            UpstreamDial::Unreachable
        }
    }
}

/// Pump frames between an already-upgraded client socket and an
/// already-connected upstream socket until either side closes. Control
/// frames are terminated at the proxy, not relayed, mirroring the asymmetric
/// keepalive handling the agent/browser channels use elsewhere in this
/// codebase.
pub async fn pump(
    client_socket: WebSocket,
    upstream_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) {
    let (mut client_tx, mut client_rx) = client_socket.split();
    let (mut upstream_tx, mut upstream_rx) = upstream_stream.split();

    let client_to_upstream = async {
        while let Some(msg) = client_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(_) => break,
            };
            let forwarded = match msg {
                AxumMessage::Text(t) => UpstreamMessage::Text(t.as_str().into()),
                AxumMessage::Binary(b) => UpstreamMessage::Binary(b.to_vec().into()),
                AxumMessage::Close(_) | AxumMessage::Ping(_) | AxumMessage::Pong(_) => break,
            };
            if upstream_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(msg) = upstream_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(_) => break,
            };
            let forwarded = match msg {
                UpstreamMessage::Text(t) => AxumMessage::Text(t.as_str().to_string().into()),
                UpstreamMessage::Binary(b) => AxumMessage::Binary(b.to_vec().into()),
                UpstreamMessage::Close(frame) => {
                    let code = frame.map(|f| f.code.into()).unwrap_or(1011);
                    let _ = client_tx
                        .send(AxumMessage::Close(Some(axum::extract::ws::CloseFrame {
                            code,
                            reason: String::new().into(),
                        })))
                        .await;
                    break;
                }
                UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_) => {
                    continue;
                }
            };
            if client_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    // Either direction finishing triggers the other's cancellation by
    // dropping it: `select!` drops the losing future, closing its half of
    // each socket.
    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
}
