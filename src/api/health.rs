//! Status and health endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::ApiState;
use crate::presence::PresenceStatus;

/// Service description served at `/`
#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Endpoints,
}

#[derive(Serialize)]
pub struct Endpoints {
    pub status: &'static str,
    pub health: &'static str,
    pub websocket: &'static str,
    pub events: &'static str,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Presence Detection Service",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: Endpoints {
            status: "/status",
            health: "/health",
            websocket: "/ws",
            events: "/ws/events",
        },
    })
}

/// Current presence; a recorded detector fault turns this into a 500
async fn status(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<PresenceStatus>) {
    let status = state.tracker.status();
    tracing::debug!(?status, "status requested");

    let code = if status.error.is_some() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    (code, Json(status))
}

/// Liveness of the tracker and its detector
async fn health(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<HealthResponse>) {
    let error = if state.tracker.is_running() {
        state.tracker.status().error
    } else {
        Some("tracker not running".to_string())
    };

    match error {
        Some(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                error: Some(error),
            }),
        ),
        None => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                error: None,
            }),
        ),
    }
}

/// Build the status router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/health", get(health))
        .with_state(state)
}
