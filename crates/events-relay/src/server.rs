//! Axum HTTP server: ingestion routes, health, graceful shutdown.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::broker::BrokerError;
use crate::relay::Relay;
use crate::topics::EventCategory;

/// Shared application state.
pub struct AppState {
    pub relay: Arc<Relay>,
}

/// A request the relay accepted but could not hand to the broker.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Only JSON objects and arrays are accepted as event bodies.
    #[error("event body must be a JSON object or array")]
    NotObjectOrArray,

    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::NotObjectOrArray => StatusCode::BAD_REQUEST,
            IngestError::Serialize(_) | IngestError::Broker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "status": "error", "message": self.to_string() }));
        (status, body).into_response()
    }
}

/// One POST route per event category plus the health check.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new().route("/api/events/health", get(handle_health));
    for category in EventCategory::ALL {
        router = router.route(
            category.path(),
            post(move |state: State<Arc<AppState>>, body: Json<Value>| {
                handle_event(state, category, body)
            }),
        );
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Build and run the HTTP server. Marks the relay's HTTP side ready once the
/// listener is bound.
pub async fn run(state: AppState, listen_addr: &str) -> anyhow::Result<()> {
    let relay = state.relay.clone();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    relay.mark_http_ready();
    tracing::info!(
        address = %listen_addr,
        broker_state = relay.connection_state().as_str(),
        "Events service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Events service shut down gracefully");
    Ok(())
}

/// Publish the body to the category's topic, then acknowledge with 201.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    category: EventCategory,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), IngestError> {
    if !(payload.is_object() || payload.is_array()) {
        tracing::warn!(topic = category.topic(), "Rejected non-object event body");
        return Err(IngestError::NotObjectOrArray);
    }
    let bytes = serde_json::to_vec(&payload)?;

    match state.relay.publish(category, bytes).await {
        Ok(offset) => {
            tracing::info!(
                category = category.as_str(),
                topic = category.topic(),
                offset = ?offset,
                payload = %payload,
                "Sent to Kafka topic"
            );
            Ok((StatusCode::CREATED, Json(json!({ "status": "success" }))))
        }
        Err(e) => {
            tracing::error!(
                topic = category.topic(),
                broker_ready = state.relay.broker_ready(),
                broker_state = state.relay.connection_state().as_str(),
                error = %e,
                "Failed to publish event"
            );
            Err(e.into())
        }
    }
}

/// Liveness only; does not look at the broker.
async fn handle_health() -> Json<Value> {
    Json(json!({ "status": true }))
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, draining connections...");
}
