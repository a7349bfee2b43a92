//! Threshold tables for the classifier and detector.
//!
//! Operators supply every table as data (see `thresholds.json` at the repo
//! root); nothing here carries a built-in regulatory default. The raw
//! document is parsed with `serde_json` and then validated into an
//! [`EngineConfig`], which is the only form the engine accepts.

use std::collections::{BTreeSet, HashMap};

use chrono::Duration;
use serde::Deserialize;

use crate::classifier::Breakpoints;
use crate::{EngineError, Parameter};

// ---

/// Threshold document as written by operators.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdsDocument {
    /// Inclusive upper bounds for good, moderate, unhealthy, very_unhealthy.
    pub breakpoints: HashMap<Parameter, Vec<f64>>,
    pub who_limits: HashMap<Parameter, f64>,
    pub alert_thresholds: HashMap<Parameter, f64>,
    pub sudden_increase: SuddenIncreaseDocument,
    pub history_capacity: usize,
    pub event_log_capacity: usize,
    pub reading_log_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuddenIncreaseDocument {
    pub ratio: f64,
    pub absolute_floor: f64,
    pub epsilon: f64,
    pub recency_window_secs: u64,
}

/// Per-parameter limits after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLimits {
    pub breakpoints: Breakpoints,
    pub who_limit: f64,
    pub alert_threshold: f64,
}

/// Sudden-increase rule settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SuddenIncreaseRule {
    /// Minimum relative rise, e.g. `0.5` for +50%.
    pub ratio: f64,
    /// Value a reading must exceed when the previous value was ~0.
    pub absolute_floor: f64,
    /// Previous values at or below this count as ~0.
    pub epsilon: f64,
    /// How old the previous reading may be and still be compared.
    pub recency_window: Duration,
}

/// Validated engine configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    limits: HashMap<Parameter, ParameterLimits>,
    pub sudden_increase: SuddenIncreaseRule,
    pub history_capacity: usize,
    pub event_log_capacity: usize,
    pub reading_log_capacity: usize,
}

impl EngineConfig {
    /// Parse and validate a JSON threshold document.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let doc: ThresholdsDocument = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("malformed thresholds document: {e}")))?;
        Self::try_from(doc)
    }

    /// Limits for `parameter`, or `UnknownParameter` if it is not configured.
    pub fn limits(&self, parameter: Parameter) -> Result<&ParameterLimits, EngineError> {
        self.limits
            .get(&parameter)
            .ok_or_else(|| EngineError::UnknownParameter(parameter.to_string()))
    }

    /// Configured parameters in canonical order.
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut params: Vec<Parameter> = self.limits.keys().copied().collect();
        params.sort();
        params
    }
}

impl TryFrom<ThresholdsDocument> for EngineConfig {
    type Error = EngineError;

    fn try_from(doc: ThresholdsDocument) -> Result<Self, Self::Error> {
        // ---
        let params: BTreeSet<Parameter> = doc
            .breakpoints
            .keys()
            .chain(doc.who_limits.keys())
            .chain(doc.alert_thresholds.keys())
            .copied()
            .collect();

        if params.is_empty() {
            return Err(EngineError::Config("no parameters configured".into()));
        }

        let mut limits = HashMap::with_capacity(params.len());
        for p in params {
            let bounds = doc
                .breakpoints
                .get(&p)
                .ok_or_else(|| missing("breakpoints", p))?;
            let who_limit = *doc.who_limits.get(&p).ok_or_else(|| missing("who_limits", p))?;
            let alert_threshold = *doc
                .alert_thresholds
                .get(&p)
                .ok_or_else(|| missing("alert_thresholds", p))?;

            let breakpoints = Breakpoints::new(bounds)
                .map_err(|e| EngineError::Config(format!("{p}: {e}")))?;
            positive("who_limits", p, who_limit)?;
            positive("alert_thresholds", p, alert_threshold)?;

            limits.insert(
                p,
                ParameterLimits {
                    breakpoints,
                    who_limit,
                    alert_threshold,
                },
            );
        }

        let rule = &doc.sudden_increase;
        if !rule.ratio.is_finite() || rule.ratio <= 0.0 {
            return Err(EngineError::Config(format!(
                "sudden_increase.ratio must be > 0, got {}",
                rule.ratio
            )));
        }
        if !rule.absolute_floor.is_finite() || rule.absolute_floor < 0.0 {
            return Err(EngineError::Config(
                "sudden_increase.absolute_floor must be >= 0".into(),
            ));
        }
        if !rule.epsilon.is_finite() || rule.epsilon < 0.0 {
            return Err(EngineError::Config(
                "sudden_increase.epsilon must be >= 0".into(),
            ));
        }
        if rule.recency_window_secs == 0 {
            return Err(EngineError::Config(
                "sudden_increase.recency_window_secs must be > 0".into(),
            ));
        }
        let recency_secs = i64::try_from(rule.recency_window_secs).map_err(|_| {
            EngineError::Config("sudden_increase.recency_window_secs is too large".into())
        })?;
        let recency_window = Duration::try_seconds(recency_secs).ok_or_else(|| {
            EngineError::Config("sudden_increase.recency_window_secs is too large".into())
        })?;

        for (name, cap) in [
            ("history_capacity", doc.history_capacity),
            ("event_log_capacity", doc.event_log_capacity),
            ("reading_log_capacity", doc.reading_log_capacity),
        ] {
            if cap == 0 {
                return Err(EngineError::Config(format!("{name} must be > 0")));
            }
        }

        Ok(EngineConfig {
            limits,
            sudden_increase: SuddenIncreaseRule {
                ratio: rule.ratio,
                absolute_floor: rule.absolute_floor,
                epsilon: rule.epsilon,
                recency_window,
            },
            history_capacity: doc.history_capacity,
            event_log_capacity: doc.event_log_capacity,
            reading_log_capacity: doc.reading_log_capacity,
        })
    }
}

fn missing(table: &str, p: Parameter) -> EngineError {
    EngineError::Config(format!("{p} is missing from {table}"))
}

fn positive(table: &str, p: Parameter, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::Config(format!(
            "{table}.{p} must be a positive number, got {value}"
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    // ---
    use super::*;

    /// Thresholds shared by the engine's unit tests.
    pub(crate) const TEST_THRESHOLDS: &str = r#"{
        "breakpoints": {
            "pm25": [25, 50, 100, 150],
            "pm10": [45, 100, 200, 300],
            "no2":  [25, 100, 200, 400],
            "so2":  [40, 125, 350, 500],
            "o3":   [60, 100, 180, 240]
        },
        "who_limits":       { "pm25": 50, "pm10": 100, "no2": 200, "so2": 350, "o3": 180 },
        "alert_thresholds": { "pm25": 125, "pm10": 250, "no2": 300, "so2": 400, "o3": 200 },
        "sudden_increase": {
            "ratio": 0.5,
            "absolute_floor": 10.0,
            "epsilon": 0.001,
            "recency_window_secs": 7200
        },
        "history_capacity": 3,
        "event_log_capacity": 10,
        "reading_log_capacity": 100
    }"#;

    pub(crate) fn test_config() -> EngineConfig {
        EngineConfig::from_json_str(TEST_THRESHOLDS).unwrap()
    }

    pub(crate) fn test_document() -> ThresholdsDocument {
        serde_json::from_str(TEST_THRESHOLDS).unwrap()
    }

    #[test]
    fn test_valid_document_builds() {
        // ---
        let cfg = test_config();

        assert_eq!(cfg.parameters(), Parameter::ALL.to_vec());
        assert_eq!(cfg.limits(Parameter::Pm25).unwrap().who_limit, 50.0);
        assert_eq!(cfg.sudden_increase.recency_window, Duration::hours(2));
        assert_eq!(cfg.history_capacity, 3);
    }

    #[test]
    fn test_partial_parameter_set_is_allowed() {
        // ---
        let mut d = test_document();
        for table in [&mut d.who_limits, &mut d.alert_thresholds] {
            table.remove(&Parameter::O3);
        }
        d.breakpoints.remove(&Parameter::O3);

        let cfg = EngineConfig::try_from(d).unwrap();
        assert!(matches!(
            cfg.limits(Parameter::O3),
            Err(EngineError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_parameter_missing_from_one_table_fails() {
        // ---
        let mut d = test_document();
        d.who_limits.remove(&Parameter::No2);

        let err = EngineConfig::try_from(d).unwrap_err();
        assert!(matches!(err, EngineError::Config(ref m) if m.contains("no2")));
    }

    #[test]
    fn test_non_monotonic_breakpoints_fail() {
        // ---
        let mut d = test_document();
        d.breakpoints.insert(Parameter::Pm10, vec![45.0, 40.0, 200.0, 300.0]);

        assert!(matches!(
            EngineConfig::try_from(d),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_bad_rule_and_capacity_values_fail() {
        // ---
        let mut d = test_document();
        d.sudden_increase.ratio = 0.0;
        assert!(EngineConfig::try_from(d).is_err());

        let mut d = test_document();
        d.sudden_increase.recency_window_secs = 0;
        assert!(EngineConfig::try_from(d).is_err());

        let mut d = test_document();
        d.history_capacity = 0;
        assert!(EngineConfig::try_from(d).is_err());

        let mut d = test_document();
        d.alert_thresholds.insert(Parameter::So2, -1.0);
        assert!(EngineConfig::try_from(d).is_err());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        // ---
        assert!(matches!(
            EngineConfig::from_json_str("{ \"breakpoints\": 3 }"),
            Err(EngineError::Config(_))
        ));
    }
}
