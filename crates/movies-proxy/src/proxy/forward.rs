//! Single-attempt transparent forwarding to the selected origin.
//!
//! Method, path, query, headers and body go out unchanged, with the body
//! streamed rather than buffered. `Host` is dropped with the other hop-by-hop
//! headers so the client sets it from the target URL. The response body is
//! streamed back verbatim. Upstream failures surface to the
//! caller; there is no retry and no failover to the other origin.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;
use url::Url;

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

/// Join the target base URL with the original path and query.
///
/// A base path on the target is kept as a prefix; the request path itself is
/// never rewritten.
pub fn upstream_url(base: &Url, path_and_query: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{base}{path_and_query}")
    } else {
        format!("{base}/{path_and_query}")
    }
}

/// Forward one request to `url` and stream the response back.
///
/// `correlation_id` only labels the span; nothing is added to the outbound
/// request or to the response.
pub async fn forward(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    headers: &HeaderMap,
    body: reqwest::Body,
    correlation_id: &str,
) -> Response {
    let span = migration_tracing::upstream_forward_span!(correlation_id, url);
    let start = Instant::now();

    async {
        let mut req_builder = client.request(method, url);

        for (name, value) in headers.iter() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            req_builder = req_builder.header(name, value);
        }

        let upstream_result = req_builder.body(body).send().await;

        build_response(upstream_result, start)
    }
    .instrument(span)
    .await
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Build an axum Response from the upstream result, streaming the body back.
fn build_response(
    upstream_result: Result<reqwest::Response, reqwest::Error>,
    start: Instant,
) -> Response {
    let upstream_resp = match upstream_result {
        Ok(resp) => resp,
        Err(e) => {
            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);

            if e.is_timeout() {
                tracing::Span::current().record("status", 504_u16);
                tracing::error!(error = %e, "Upstream timeout");
                return (StatusCode::GATEWAY_TIMEOUT, "upstream timeout").into_response();
            }
            tracing::Span::current().record("status", 502_u16);
            tracing::error!(error = %e, "Upstream connection error");
            return (StatusCode::BAD_GATEWAY, "upstream connection error").into_response();
        }
    };

    let status = upstream_resp.status();
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);
    tracing::Span::current().record("status", status.as_u16());

    tracing::debug!(
        status = status.as_u16(),
        latency_ms = latency,
        "Forward complete"
    );

    let mut response_builder = Response::builder()
        .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));

    for (name, value) in upstream_resp.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        response_builder = response_builder.header(name, value);
    }

    let body = Body::from_stream(upstream_resp.bytes_stream());

    response_builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build response");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    })
}
