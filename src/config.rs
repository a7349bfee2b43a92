//! Configuration loader for the `codemetal-airwatch` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Threshold tables are not environment values; they
//! live in the JSON document named by `THRESHOLDS_FILE` and are loaded into an
//! [`EngineConfig`] here so a malformed table stops startup before any reading
//! is accepted.
use std::{env, fs, net::SocketAddr};

use anyhow::{anyhow, Context, Result};

use crate::EngineConfig;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed service configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Path of the JSON threshold document.
    pub thresholds_file: String,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Upstream sensor API base URL; polling is disabled when unset.
    pub api_url: Option<String>,

    /// Maximum number of API pages to fetch per poll (safety limit).
    pub api_max_pages: u32,

    /// Seconds between upstream polls.
    pub poll_interval_secs: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `THRESHOLDS_FILE` – path to the threshold JSON document
///
/// Optional:
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `SENSOR_API_URL` – upstream sensor API; enables polling when set
/// - `API_MAX_PAGES` – max API pages per poll (default: 100)
/// - `POLL_INTERVAL_SECS` – seconds between polls (default: 60)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let thresholds_file = require_env!("THRESHOLDS_FILE");
    let bind_addr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;
    let api_url = env::var("SENSOR_API_URL")
        .ok()
        .filter(|url| !url.trim().is_empty());
    let api_max_pages = parse_env_u32!("API_MAX_PAGES", 100);
    let poll_interval_secs = parse_env_u32!("POLL_INTERVAL_SECS", 60);

    if poll_interval_secs == 0 {
        return Err(anyhow!("POLL_INTERVAL_SECS must be greater than 0"));
    }

    Ok(Config {
        thresholds_file,
        bind_addr,
        api_url,
        api_max_pages,
        poll_interval_secs,
    })
}

impl Config {
    /// Read and validate the threshold document named by `thresholds_file`.
    pub fn load_thresholds(&self) -> Result<EngineConfig> {
        // ---
        let json = fs::read_to_string(&self.thresholds_file)
            .with_context(|| format!("Failed to read thresholds file '{}'", self.thresholds_file))?;
        let engine = EngineConfig::from_json_str(&json)
            .with_context(|| format!("Rejected thresholds file '{}'", self.thresholds_file))?;
        Ok(engine)
    }

    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  THRESHOLDS_FILE    : {}", self.thresholds_file);
        tracing::info!("  BIND_ADDR          : {}", self.bind_addr);
        tracing::info!(
            "  SENSOR_API_URL     : {}",
            self.api_url.as_deref().unwrap_or("(polling disabled)")
        );
        tracing::info!("  API_MAX_PAGES      : {}", self.api_max_pages);
        tracing::info!("  POLL_INTERVAL_SECS : {}", self.poll_interval_secs);
    }
}

impl EngineConfig {
    /// Log the threshold tables actually in force.
    pub fn log_thresholds(&self) {
        // ---
        for p in self.parameters() {
            if let Ok(limits) = self.limits(p) {
                tracing::info!(
                    "  {:<5} breakpoints={:?} who_limit={} alert_threshold={}",
                    p.as_str(),
                    limits.breakpoints.bounds(),
                    limits.who_limit,
                    limits.alert_threshold
                );
            }
        }
        let rule = &self.sudden_increase;
        tracing::info!(
            "  sudden_increase ratio={} floor={} epsilon={} recency={}s",
            rule.ratio,
            rule.absolute_floor,
            rule.epsilon,
            rule.recency_window.num_seconds()
        );
        tracing::info!(
            "  capacities history={} events={} readings={}",
            self.history_capacity,
            self.event_log_capacity,
            self.reading_log_capacity
        );
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::thresholds::tests::TEST_THRESHOLDS;

    fn config_for(path: &str) -> Config {
        Config {
            thresholds_file: path.to_string(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            api_url: None,
            api_max_pages: 1,
            poll_interval_secs: 1,
        }
    }

    #[test]
    fn test_load_thresholds_from_file() {
        // ---
        let path = env::temp_dir().join(format!("airwatch-thresholds-{}.json", std::process::id()));
        fs::write(&path, TEST_THRESHOLDS).unwrap();

        let engine = config_for(path.to_str().unwrap()).load_thresholds().unwrap();
        assert_eq!(engine.history_capacity, 3);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_thresholds_file_is_an_error() {
        // ---
        let err = config_for("/nonexistent/airwatch/thresholds.json")
            .load_thresholds()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read thresholds file"));
    }
}
