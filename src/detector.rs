//! Anomaly rules evaluated against each incoming reading.
//!
//! Three independent rules run for every reading, always in this order:
//!
//! 1. `who_limit_exceeded` – value above the fixed regulatory reference.
//! 2. `threshold_exceeded` – value above the operator-tuned alert threshold.
//! 3. `sudden_increase` – value rose by at least the configured ratio over
//!    the shard's previous reading, provided that reading is recent enough.
//!
//! Detection is pure: the same reading and history always produce the same
//! events. Timestamps come from the reading, never from the wall clock.

use tracing::warn;
use uuid::Uuid;

use crate::history::ShardHistory;
use crate::thresholds::SuddenIncreaseRule;
use crate::{
    classifier, AnomalyEvent, AnomalyKind, AnomalySeverity, EngineConfig, EngineError, Reading,
};

// ---

/// Evaluate every rule for `reading` given the shard's prior `history`.
///
/// Returns unstamped events (`seq == 0`, nil id); the events log assigns
/// both on append.
pub fn detect(
    config: &EngineConfig,
    reading: &Reading,
    history: &ShardHistory,
) -> Result<Vec<AnomalyEvent>, EngineError> {
    // ---
    classifier::check_value(reading.value)?;
    let limits = config.limits(reading.parameter)?;

    let mut events = Vec::new();

    if let Some(event) = exceeds(reading, AnomalyKind::WhoLimitExceeded, limits.who_limit) {
        events.push(event);
    }
    if let Some(event) = exceeds(
        reading,
        AnomalyKind::ThresholdExceeded,
        limits.alert_threshold,
    ) {
        events.push(event);
    }
    if let Some(event) = sudden_increase(&config.sudden_increase, reading, history) {
        events.push(event);
    }

    for event in &events {
        warn!(
            city = %event.city,
            parameter = %event.parameter,
            value = event.value,
            threshold = ?event.threshold,
            previous_value = ?event.previous_value,
            severity = ?event.severity,
            "Anomaly detected: {:?} at ({}, {})",
            event.kind,
            event.location.latitude,
            event.location.longitude,
        );
    }

    Ok(events)
}

/// Strict `value > limit` comparison shared by the two fixed-limit rules.
fn exceeds(reading: &Reading, kind: AnomalyKind, limit: f64) -> Option<AnomalyEvent> {
    if reading.value > limit {
        let severity = AnomalySeverity::from_ratio(reading.value / limit);
        Some(event(reading, kind, severity, Some(limit), None))
    } else {
        None
    }
}

fn sudden_increase(
    rule: &SuddenIncreaseRule,
    reading: &Reading,
    history: &ShardHistory,
) -> Option<AnomalyEvent> {
    // ---
    let previous = history.previous_to(reading.observed_at)?;
    if reading.observed_at - previous.observed_at > rule.recency_window {
        return None;
    }

    let prev = previous.value;
    let fired = if prev <= rule.epsilon {
        reading.value > rule.absolute_floor
    } else {
        (reading.value - prev) / prev >= rule.ratio
    };
    if !fired {
        return None;
    }

    let severity = AnomalySeverity::from_ratio(reading.value / prev.max(rule.epsilon));
    Some(event(
        reading,
        AnomalyKind::SuddenIncrease,
        severity,
        None,
        Some(prev),
    ))
}

fn event(
    reading: &Reading,
    kind: AnomalyKind,
    severity: AnomalySeverity,
    threshold: Option<f64>,
    previous_value: Option<f64>,
) -> AnomalyEvent {
    AnomalyEvent {
        seq: 0,
        id: Uuid::nil(),
        kind,
        severity,
        location: reading.location,
        city: reading.city.clone(),
        parameter: reading.parameter,
        value: reading.value,
        threshold,
        previous_value,
        detected_at: reading.observed_at,
    }
}
