//! Correlation IDs tying a routed request to its upstream hop in the logs.
//!
//! The ID lives only in spans. A caller-supplied header is forwarded like any
//! other header; the router never adds one to the request or the response.

use axum::http::HeaderMap;
use uuid::Uuid;

/// Header a caller may use to supply its own correlation ID.
pub const CORRELATION_HEADER: &str = "x-migration-request-id";

/// Generate a new correlation ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reuse the caller's correlation ID when it sent one.
pub fn from_headers(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_inbound_id_is_reused() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(from_headers(&headers), "abc-123");
    }

    #[test]
    fn test_missing_id_is_generated() {
        let id = from_headers(&HeaderMap::new());
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
