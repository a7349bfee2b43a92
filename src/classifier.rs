//! Table-driven severity classification.

use serde::Serialize;

use crate::{EngineConfig, EngineError, Parameter, SeverityTier};

// ---

/// Ascending inclusive upper bounds for the first four tiers. Anything above
/// the last bound is `Hazardous`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Breakpoints([f64; 4]);

impl Breakpoints {
    pub fn new(bounds: &[f64]) -> Result<Self, String> {
        // ---
        let bounds: [f64; 4] = bounds
            .try_into()
            .map_err(|_| format!("expected 4 breakpoints, got {}", bounds.len()))?;

        if bounds.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(format!("breakpoints must be positive numbers: {bounds:?}"));
        }
        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("breakpoints must strictly increase: {bounds:?}"));
        }
        Ok(Breakpoints(bounds))
    }

    pub fn bounds(&self) -> &[f64; 4] {
        &self.0
    }

    /// Tier for a value already known to be in domain.
    pub fn tier_for(&self, value: f64) -> SeverityTier {
        let band = self.0.iter().position(|&upper| value <= upper).unwrap_or(4);
        SeverityTier::ALL[band]
    }

    /// Tier plus the value's relative position inside that tier's band, in `[0, 1]`.
    ///
    /// The open-ended hazardous band is given the same width as the
    /// very-unhealthy band and saturates at 1.
    pub fn position(&self, value: f64) -> (SeverityTier, f64) {
        // ---
        let tier = self.tier_for(value);
        let b = &self.0;
        let (low, high) = match tier.index() {
            0 => (0.0, b[0]),
            i @ 1..=3 => (b[i - 1], b[i]),
            _ => (b[3], b[3] + (b[3] - b[2])),
        };
        let fraction = ((value - low) / (high - low)).clamp(0.0, 1.0);
        (tier, fraction)
    }
}

/// Value-domain check shared by every entry point: finite and non-negative.
pub fn check_value(value: f64) -> Result<(), EngineError> {
    if !value.is_finite() {
        return Err(EngineError::InvalidReading(format!(
            "value must be finite, got {value}"
        )));
    }
    if value < 0.0 {
        return Err(EngineError::InvalidReading(format!(
            "value must be >= 0, got {value}"
        )));
    }
    Ok(())
}

/// Map one pollutant value to its severity tier.
pub fn classify(
    config: &EngineConfig,
    parameter: Parameter,
    value: f64,
) -> Result<SeverityTier, EngineError> {
    check_value(value)?;
    Ok(config.limits(parameter)?.breakpoints.tier_for(value))
}
