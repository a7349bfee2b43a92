use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::get, Json,
    Router,
};
use serde::Deserialize;

use super::AppState;

// ---

const DEFAULT_LIMIT: usize = 10;

pub fn router() -> Router<AppState> {
    Router::new().route("/anomalies", get(handler))
}

#[derive(Debug, Deserialize)]
struct AnomaliesQuery {
    limit: Option<usize>,
}

/// `GET /anomalies` – recent anomaly events, newest first.
async fn handler(
    Query(params): Query<AnomaliesQuery>,
    State(coordinator): State<AppState>,
) -> impl IntoResponse {
    // ---
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    match coordinator.recent_events(limit) {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(e) => e.into_response(),
    }
}
