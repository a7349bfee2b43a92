use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};

use super::{AppState, ErrorBody};
use crate::marker::MarkerView;
use crate::{IngestOutcome, RawMeasurement, RawReading, ReadingFilter};

// ---

/// Default cap on markers returned by `GET /readings`.
const DEFAULT_MARKER_LIMIT: usize = 1000;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/readings", post(ingest).get(current))
        .route("/measurements", post(ingest_measurement))
}

/// `POST /readings` – ingest one reading.
async fn ingest(
    State(coordinator): State<AppState>,
    Json(raw): Json<RawReading>,
) -> impl IntoResponse {
    // ---
    debug!("POST /readings - {} at {}", raw.parameter, raw.observed_at);

    match coordinator.ingest_raw(&raw) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Per-pollutant result for `POST /measurements`.
#[derive(Serialize)]
struct MeasurementOutcome {
    parameter: String,
    #[serde(flatten)]
    outcome: Option<IngestOutcome>,
    error: Option<ErrorBody>,
}

/// `POST /measurements` – ingest a multi-pollutant station document.
async fn ingest_measurement(
    State(coordinator): State<AppState>,
    Json(doc): Json<RawMeasurement>,
) -> impl IntoResponse {
    // ---
    let outcomes = match coordinator.ingest_measurement(&doc) {
        Ok(outcomes) => outcomes,
        Err(e) => return e.into_response(),
    };

    let body: Vec<MeasurementOutcome> = outcomes
        .into_iter()
        .map(|(parameter, result)| match result {
            Ok(outcome) => MeasurementOutcome {
                parameter,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => MeasurementOutcome {
                parameter,
                outcome: None,
                error: Some(ErrorBody::from(&e)),
            },
        })
        .collect();

    info!("POST /measurements - {} pollutant(s) processed", body.len());
    (StatusCode::OK, Json(body)).into_response()
}

/// `GET /readings` – latest reading per shard, projected for map markers.
async fn current(
    Query(mut filter): Query<ReadingFilter>,
    State(coordinator): State<AppState>,
) -> impl IntoResponse {
    // ---
    filter.limit = Some(filter.limit.unwrap_or(DEFAULT_MARKER_LIMIT));
    debug!("GET /readings - filter: {:?}", filter);

    let current = match coordinator.current_readings(&filter) {
        Ok(current) => current,
        Err(e) => return e.into_response(),
    };

    let markers: Result<Vec<MarkerView>, _> = current
        .into_iter()
        .map(|(reading, tier)| MarkerView::new(coordinator.config(), reading, tier))
        .collect();

    match markers {
        Ok(markers) => (StatusCode::OK, Json(markers)).into_response(),
        Err(e) => e.into_response(),
    }
}
