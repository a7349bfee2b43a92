//! Data models for the air-quality feed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

// ---

/// Pollutants tracked by the engine. Concentrations are in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Pm25,
    Pm10,
    No2,
    So2,
    O3,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::Pm25,
        Parameter::Pm10,
        Parameter::No2,
        Parameter::So2,
        Parameter::O3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Pm25 => "pm25",
            Parameter::Pm10 => "pm10",
            Parameter::No2 => "no2",
            Parameter::So2 => "so2",
            Parameter::O3 => "o3",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pm25" | "pm2.5" | "pm2_5" => Ok(Parameter::Pm25),
            "pm10" => Ok(Parameter::Pm10),
            "no2" => Ok(Parameter::No2),
            "so2" => Ok(Parameter::So2),
            "o3" => Ok(Parameter::O3),
            other => Err(EngineError::UnknownParameter(other.to_string())),
        }
    }
}

/// Ordered severity of a single reading. `Good < Moderate < ... < Hazardous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    Good,
    Moderate,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl SeverityTier {
    /// Tiers in ascending order; index matches the breakpoint band.
    pub const ALL: [SeverityTier; 5] = [
        SeverityTier::Good,
        SeverityTier::Moderate,
        SeverityTier::Unhealthy,
        SeverityTier::VeryUnhealthy,
        SeverityTier::Hazardous,
    ];

    pub fn index(&self) -> usize {
        match self {
            SeverityTier::Good => 0,
            SeverityTier::Moderate => 1,
            SeverityTier::Unhealthy => 2,
            SeverityTier::VeryUnhealthy => 3,
            SeverityTier::Hazardous => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SeverityTier::Good => "Good",
            SeverityTier::Moderate => "Moderate",
            SeverityTier::Unhealthy => "Unhealthy",
            SeverityTier::VeryUnhealthy => "Very unhealthy",
            SeverityTier::Hazardous => "Hazardous",
        }
    }

    /// Marker fill color for map rendering.
    pub fn color(&self) -> &'static str {
        match self {
            SeverityTier::Good => "#28a745",
            SeverityTier::Moderate => "#bfd200",
            SeverityTier::Unhealthy => "#ffa500",
            SeverityTier::VeryUnhealthy => "#dc3545",
            SeverityTier::Hazardous => "#7e0023",
        }
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn key(&self) -> LocationKey {
        LocationKey::from(*self)
    }
}

/// Coordinates quantized to 1e-4 degrees so float jitter from the same
/// station does not split its history across shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    lat_e4: i64,
    lon_e4: i64,
}

const LOCATION_SCALE: f64 = 10_000.0;

impl From<GeoPoint> for LocationKey {
    fn from(point: GeoPoint) -> Self {
        LocationKey {
            lat_e4: (point.latitude * LOCATION_SCALE).round() as i64,
            lon_e4: (point.longitude * LOCATION_SCALE).round() as i64,
        }
    }
}

/// One timestamped pollutant measurement at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub location: GeoPoint,
    pub city: String,
    pub parameter: Parameter,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    /// Build a reading, rejecting it if any field is out of domain.
    pub fn new(
        location: GeoPoint,
        city: impl Into<String>,
        parameter: Parameter,
        value: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        // ---
        let reading = Reading {
            location,
            city: city.into(),
            parameter,
            value,
            observed_at,
        };
        reading.validate()?;
        Ok(reading)
    }

    /// Check coordinates, city and value domain.
    pub fn validate(&self) -> Result<(), EngineError> {
        // ---
        let GeoPoint {
            latitude,
            longitude,
        } = self.location;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(EngineError::InvalidReading(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(EngineError::InvalidReading(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        if self.city.trim().is_empty() {
            return Err(EngineError::InvalidReading("city is required".into()));
        }
        crate::classifier::check_value(self.value)
    }

    pub fn location_key(&self) -> LocationKey {
        self.location.key()
    }
}

/// Reading as posted by sensors or the upstream feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawReading {
    // ---
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub city: Option<String>,
    pub parameter: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl RawReading {
    pub fn to_reading(&self) -> Result<Reading, EngineError> {
        // ---
        let parameter: Parameter = self.parameter.parse()?;
        let city = self
            .city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| EngineError::InvalidReading("city is required".into()))?;

        Reading::new(
            GeoPoint {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            city,
            parameter,
            self.value,
            self.observed_at,
        )
    }
}

/// Multi-pollutant station document: one timestamp, any subset of pollutants.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawMeasurement {
    // ---
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub city: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub o3: Option<f64>,
}

impl RawMeasurement {
    /// Split into one raw reading per reported pollutant, in `Parameter::ALL` order.
    pub fn split(&self) -> Vec<RawReading> {
        // ---
        Parameter::ALL
            .iter()
            .filter_map(|&p| {
                let value = match p {
                    Parameter::Pm25 => self.pm25,
                    Parameter::Pm10 => self.pm10,
                    Parameter::No2 => self.no2,
                    Parameter::So2 => self.so2,
                    Parameter::O3 => self.o3,
                }?;
                Some(RawReading {
                    latitude: self.latitude,
                    longitude: self.longitude,
                    city: self.city.clone(),
                    parameter: p.as_str().to_string(),
                    value,
                    observed_at: self.timestamp,
                })
            })
            .collect()
    }
}

/// Anomaly rule that fired for a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    WhoLimitExceeded,
    ThresholdExceeded,
    SuddenIncrease,
}

/// How far a reading overshot the reference it was compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    /// Grade an overshoot ratio (`value / reference`).
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 3.0 {
            AnomalySeverity::Critical
        } else if ratio >= 2.0 {
            AnomalySeverity::High
        } else if ratio >= 1.5 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        }
    }
}

/// A noteworthy condition derived from one reading.
///
/// The detector produces events with `seq == 0` and a nil `id`; the events
/// log stamps both when the event is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    // ---
    pub seq: u64,
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: AnomalySeverity,
    pub location: GeoPoint,
    pub city: String,
    pub parameter: Parameter,
    pub value: f64,
    pub threshold: Option<f64>,
    pub previous_value: Option<f64>,
    pub detected_at: DateTime<Utc>,
}

impl AnomalyEvent {
    pub fn location_key(&self) -> LocationKey {
        self.location.key()
    }

    pub fn is_stamped(&self) -> bool {
        self.seq != 0
    }
}

/// Derived view over a trailing window of readings and events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_alerts: usize,
    pub who_limit_exceeded_count: usize,
    pub threshold_exceeded_count: usize,
    pub sudden_increase_count: usize,
    pub affected_region_count: usize,
    /// `None` when the window holds no readings.
    pub highest_value: Option<f64>,
    pub reading_count: usize,
}
