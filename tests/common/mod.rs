//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use airwatch::EngineConfig;

/// PM2.5 good band ends at 25 here so the Ankara walk-through reads
/// 20 as good; WHO limit 50 and alert threshold 125 sit between the
/// moderate and hazardous bands.
pub const THRESHOLDS: &str = r#"{
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
    "event_log_capacity": 50,
    "reading_log_capacity": 500
}"#;

pub fn engine_config() -> EngineConfig {
    EngineConfig::from_json_str(THRESHOLDS).unwrap()
}
