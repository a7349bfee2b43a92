//! HTTP gateway over the feed coordinator.
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! attaches the shared coordinator as state, so `main.rs` never needs to
//! know about individual endpoints.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;

use crate::{EngineError, FeedCoordinator};

mod anomalies;
mod health;
mod readings;
mod summary;
mod ws;

// ---

pub type AppState = Arc<FeedCoordinator>;

pub fn router(coordinator: AppState) -> Router {
    // ---
    Router::new()
        .merge(readings::router())
        .merge(anomalies::router())
        .merge(summary::router())
        .merge(ws::router())
        .merge(health::router())
        .with_state(coordinator)
}

/// JSON error body returned for any engine error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

impl From<&EngineError> for ErrorBody {
    fn from(e: &EngineError) -> Self {
        ErrorBody {
            error: e.to_string(),
            kind: e.kind(),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        // ---
        let status = if self.is_rejection() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            tracing::error!("Engine failure: {}", self);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}
