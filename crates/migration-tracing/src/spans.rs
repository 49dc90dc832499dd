//! Span builder helpers shared by the router and the relay.

/// Span for one proxied request on the router.
///
/// `route` and `status` are recorded once the target is chosen and the
/// upstream answers.
#[macro_export]
macro_rules! proxy_request_span {
    ($correlation_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "proxy_request",
            correlation_id = %$correlation_id,
            method = %$method,
            path = %$path,
            route = tracing::field::Empty,
            status = tracing::field::Empty,
        )
    };
}

/// Span for the single upstream attempt of a proxied request.
#[macro_export]
macro_rules! upstream_forward_span {
    ($correlation_id:expr, $url:expr) => {
        tracing::info_span!(
            "upstream_forward",
            correlation_id = %$correlation_id,
            url = %$url,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Span for publishing one event to a broker topic.
#[macro_export]
macro_rules! publish_span {
    ($topic:expr, $bytes:expr) => {
        tracing::info_span!(
            "publish_event",
            topic = %$topic,
            bytes = $bytes,
            offset = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
