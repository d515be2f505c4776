//! HTTP discovery rewriting and opaque reverse-proxying (spec §4.1).

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::rewrite::rewrite_authority;
use crate::AppState;

/// Hop-by-hop headers that must not be forwarded verbatim in either direction
/// (RFC 7230 §6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// `GET /json`, `/json/list`, `/json/version`: fetch the same path upstream,
/// rewrite every embedded upstream authority to our own, and pass the status
/// and content-type through unchanged.
pub async fn discovery_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let url = format!("{}{}", state.target.upstream_base_http, uri);
    let upstream = match state.client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(url, error = %e, "CDP upstream unreachable");
            return (StatusCode::BAD_GATEWAY, "upstream unreachable").into_response();
        }
    };

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .cloned();
    let body = match upstream.text().await {
        Ok(b) => b,
        Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
    };

    let rewritten = rewrite_authority(&body, &state.target.upstream_authority, &state.target.proxy_authority);

    let mut response = (status, rewritten).into_response();
    if let Some(ct) = content_type {
        response.headers_mut().insert(axum::http::header::CONTENT_TYPE, ct);
    }
    response
}

/// Opaque reverse proxy for every other HTTP path: method, headers (minus
/// hop-by-hop), and body pass through untouched in both directions.
pub async fn opaque_proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> Response {
    strip_hop_by_hop(&mut headers);
    headers.remove(axum::http::header::HOST);

    let url = format!("{}{}", state.target.upstream_base_http, uri);
    let mut request = state.client.request(method, &url);
    for (name, value) in headers.iter() {
        request = request.header(name.clone(), value.clone());
    }
    request = request.body(body);

    let upstream = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(url, error = %e, "CDP upstream unreachable");
            return (StatusCode::BAD_GATEWAY, "upstream unreachable").into_response();
        }
    };

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    let body = match upstream.bytes().await {
        Ok(b) => b,
        Err(_) => return StatusCode::BAD_GATEWAY.into_response(),
    };

    let mut response = (status, body).into_response();
    for (name, value) in response_headers.iter() {
        if let Ok(name) = HeaderName::from_bytes(name.as_str().as_bytes()) {
            response.headers_mut().insert(name, value.clone());
        }
    }
    response
}
