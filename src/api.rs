//! HTTP intake for recorder webhooks.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use crate::events::RecorderEvent;
use crate::manager::PublishManager;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Build the service router.
pub fn router(manager: Arc<PublishManager>) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(manager)
}

/// Receive one lifecycle event from the recorder.
///
/// Always answers 200 once the body parses; processing errors are logged,
/// never surfaced to the recorder (it would only retry or drop them).
async fn webhook(
    State(manager): State<Arc<PublishManager>>,
    Json(event): Json<RecorderEvent>,
) -> StatusCode {
    manager.handle_event(event).await;
    StatusCode::OK
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
