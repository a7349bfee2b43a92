//! Air-quality classification and anomaly-detection engine.
//!
//! Readings flow one way through the engine:
//! - `classifier` maps a pollutant value to a [`SeverityTier`]
//! - `detector` turns a reading plus its shard history into [`AnomalyEvent`]s
//! - `coordinator` owns the histories and the events log and is the only
//!   place state changes
//! - `aggregator` reduces a window of readings and events to [`SummaryStats`]
//!
//! The HTTP surface (`routes`) and the upstream `poller` are thin adapters
//! over [`FeedCoordinator`]; neither holds decision logic.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod event_log;
pub mod history;
pub mod marker;
pub mod poller;
pub mod routes;
pub mod thresholds;

mod error;
mod models;

pub use config::Config;
pub use coordinator::{FeedCoordinator, FeedUpdate, IngestOutcome, ReadingFilter};
pub use error::EngineError;
pub use models::{
    AnomalyEvent, AnomalyKind, AnomalySeverity, GeoPoint, LocationKey, Parameter, RawMeasurement,
    RawReading, Reading, SeverityTier, SummaryStats,
};
pub use thresholds::EngineConfig;
