//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::MigrationPolicy;
use crate::proxy::correlation;
use crate::proxy::forward;
use crate::routing::{self, Route};

/// Shared application state.
pub struct AppState {
    pub policy: MigrationPolicy,
    pub client: reqwest::Client,
}

/// Routes handled by the migration router. Anything else is a 404.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/movies", any(handle_movies))
        .route("/api/movies/", any(handle_movies))
        .route("/api/movies/{*rest}", any(handle_movies))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build and run the HTTP server.
pub async fn run(state: AppState, listen_addr: &str) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(address = %listen_addr, "Proxy service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Proxy service shut down gracefully");
    Ok(())
}

/// Route one `/api/movies` request to the monolith or the movies service
/// and relay the upstream response.
async fn handle_movies(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let correlation_id = correlation::from_headers(request.headers());
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let span = migration_tracing::proxy_request_span!(&correlation_id, &method, &path_and_query);

    async {
        let route = routing::select_target(&state.policy, || {
            routing::uniform_draw(&mut rand::thread_rng())
        });
        tracing::Span::current().record("route", route.as_str());

        let url = forward::upstream_url(state.policy.base_url(route), &path_and_query);
        if route == Route::NewService {
            tracing::debug!(url = %url, percent = state.policy.percent, "Routing to movies service");
        }

        let (parts, body) = request.into_parts();
        let headers = parts.headers;
        // Streamed through without buffering or a size cap.
        let body = reqwest::Body::wrap_stream(body.into_data_stream());

        let response =
            forward::forward(&state.client, method, &url, &headers, body, &correlation_id).await;
        tracing::Span::current().record("status", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, draining connections...");
}
