use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::get, Json,
    Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use super::AppState;
use crate::aggregator::SummaryFilter;
use crate::Parameter;

// ---

const DEFAULT_WINDOW_HOURS: u32 = 24;

pub fn router() -> Router<AppState> {
    Router::new().route("/summary", get(handler))
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    window_hours: Option<u32>,
    parameter: Option<Parameter>,
}

/// `GET /summary` – dashboard statistics for the trailing window.
async fn handler(
    Query(params): Query<SummaryQuery>,
    State(coordinator): State<AppState>,
) -> impl IntoResponse {
    // ---
    let hours = params.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    let filter = SummaryFilter {
        window: Duration::hours(i64::from(hours)),
        parameter: params.parameter,
    };

    match coordinator.current_summary(&filter, Utc::now()) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => e.into_response(),
    }
}
