// src/routes/health.rs
//! API health check endpoint.
//!
//! Defines the `/health` route used by container orchestrators and CI to
//! verify the service is running. Alongside liveness it reports whether the
//! coordinator is idle or mid-ingest.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;
use crate::coordinator::CoordinatorState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: CoordinatorState,
}

/// Handle `GET /health`.
///
/// Lightweight: reads an atomic counter and nothing else.
async fn health(State(coordinator): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine: coordinator.state(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
