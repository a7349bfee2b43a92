//! Summary statistics over a window of readings and anomaly events.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::{AnomalyEvent, AnomalyKind, Parameter, Reading, SummaryStats};

// ---

/// Caller-chosen window and optional pollutant scope for a summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryFilter {
    pub window: Duration,
    pub parameter: Option<Parameter>,
}

impl SummaryFilter {
    pub fn trailing(window: Duration) -> Self {
        SummaryFilter {
            window,
            parameter: None,
        }
    }

    pub fn for_parameter(mut self, parameter: Parameter) -> Self {
        self.parameter = Some(parameter);
        self
    }

    fn in_window(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        at <= now && now - at <= self.window
    }

    fn in_scope(&self, parameter: Parameter) -> bool {
        self.parameter.map_or(true, |p| p == parameter)
    }

    pub fn admits_reading(&self, reading: &Reading, now: DateTime<Utc>) -> bool {
        self.in_scope(reading.parameter) && self.in_window(reading.observed_at, now)
    }

    pub fn admits_event(&self, event: &AnomalyEvent, now: DateTime<Utc>) -> bool {
        self.in_scope(event.parameter) && self.in_window(event.detected_at, now)
    }
}

/// Reduce already-windowed readings and events to summary statistics.
///
/// Never fails; empty inputs yield `SummaryStats::default()`.
pub fn summarize<'a, R, E>(readings: R, events: E) -> SummaryStats
where
    R: IntoIterator<Item = &'a Reading>,
    E: IntoIterator<Item = &'a AnomalyEvent>,
{
    // ---
    let mut stats = SummaryStats::default();

    for reading in readings {
        stats.reading_count += 1;
        stats.highest_value = Some(match stats.highest_value {
            Some(max) => max.max(reading.value),
            None => reading.value,
        });
    }

    let mut regions = HashSet::new();
    for event in events {
        stats.total_alerts += 1;
        match event.kind {
            AnomalyKind::WhoLimitExceeded => stats.who_limit_exceeded_count += 1,
            AnomalyKind::ThresholdExceeded => stats.threshold_exceeded_count += 1,
            AnomalyKind::SuddenIncrease => stats.sudden_increase_count += 1,
        }
        regions.insert(event.location_key());
    }
    stats.affected_region_count = regions.len();

    stats
}
