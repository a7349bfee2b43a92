//! Optional upstream poller.
//!
//! When `SENSOR_API_URL` is configured, a background task fetches the
//! upstream feed on a fixed cadence and pushes every reading through
//! [`FeedCoordinator::ingest_raw`]. The upstream serves cursor-paginated
//! pages of the form `{"results": [RawReading, ...], "next_cursor": "..."}`.
//! Items that fail to parse and readings the engine rejects are logged and
//! skipped; a failed poll is retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

use crate::{FeedCoordinator, RawReading};

// ---

/// Totals for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub events: usize,
}

/// Poll `api_url` every `interval` forever.
pub async fn run(
    coordinator: Arc<FeedCoordinator>,
    api_url: String,
    max_pages: u32,
    interval: Duration,
) {
    // ---
    let client = Client::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match poll_once(&client, &coordinator, &api_url, max_pages).await {
            Ok(report) => tracing::info!(
                "Poll complete: fetched={} accepted={} rejected={} events={}",
                report.fetched,
                report.accepted,
                report.rejected,
                report.events
            ),
            Err(e) => tracing::error!("Failed to poll sensor API: {}", e),
        }
    }
}

/// Fetch every page once and ingest the readings.
pub async fn poll_once(
    client: &Client,
    coordinator: &FeedCoordinator,
    api_url: &str,
    max_pages: u32,
) -> Result<PollReport> {
    // ---
    let readings = fetch_sensor_data(client, api_url, max_pages).await?;

    let mut report = PollReport {
        fetched: readings.len(),
        ..PollReport::default()
    };
    for raw in &readings {
        match coordinator.ingest_raw(raw) {
            Ok(outcome) => {
                report.accepted += 1;
                report.events += outcome.events.len();
            }
            Err(e) if e.is_rejection() => report.rejected += 1,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(report)
}

/// Fetch paginated readings from the upstream API.
async fn fetch_sensor_data(
    client: &Client,
    base_url: &str,
    max_pages: u32,
) -> Result<Vec<RawReading>> {
    // ---
    let mut all_data = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page_count = 0;

    loop {
        if page_count >= max_pages {
            tracing::debug!(
                "Hit page limit of {}, stopping pagination. Fetched {} records so far.",
                max_pages,
                all_data.len()
            );
            break;
        }
        page_count += 1;

        let mut request = client.get(base_url);
        if let Some(ref cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        tracing::debug!("Fetching page {} from: {}", page_count, base_url);

        let response: serde_json::Value = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(data) = response.get("results").and_then(|d| d.as_array()) {
            tracing::debug!(
                "Page {} found data array with {} items",
                page_count,
                data.len()
            );
            for (i, item) in data.iter().enumerate() {
                match serde_json::from_value::<RawReading>(item.clone()) {
                    Ok(reading) => all_data.push(reading),
                    Err(e) => {
                        tracing::debug!(
                            "Failed to parse item {} on page {}: {} - Raw item: {}",
                            i,
                            page_count,
                            e,
                            item
                        );
                    }
                }
            }
        } else {
            tracing::debug!(
                "Page {} response missing 'results' field or not an array",
                page_count
            );
        }

        cursor = response
            .get("next_cursor")
            .and_then(|c| c.as_str())
            .map(String::from);

        if cursor.is_none() {
            break;
        }
    }

    tracing::debug!(
        "Finished fetching {} total records from {} pages",
        all_data.len(),
        page_count
    );
    Ok(all_data)
}
