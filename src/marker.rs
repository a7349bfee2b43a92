//! Map marker projection of current readings.

use serde::Serialize;

use crate::classifier::Breakpoints;
use crate::{EngineConfig, EngineError, Reading, SeverityTier};

// ---

const MIN_RADIUS: f64 = 6.0;
const RADIUS_STEP: f64 = 4.0;

/// A reading ready for map rendering.
#[derive(Debug, Clone, Serialize)]
pub struct MarkerView {
    #[serde(flatten)]
    pub reading: Reading,
    pub tier: SeverityTier,
    pub color: &'static str,
    pub radius: f64,
}

impl MarkerView {
    pub fn new(
        config: &EngineConfig,
        reading: Reading,
        tier: SeverityTier,
    ) -> Result<Self, EngineError> {
        let breakpoints = &config.limits(reading.parameter)?.breakpoints;
        let radius = marker_radius(breakpoints, reading.value);
        Ok(MarkerView {
            reading,
            tier,
            color: tier.color(),
            radius,
        })
    }
}

/// Marker radius in pixels: grows by `RADIUS_STEP` across each breakpoint
/// band, interpolated inside the band. Continuous and non-decreasing in
/// `value`; saturates one band-width into the hazardous range.
pub fn marker_radius(breakpoints: &Breakpoints, value: f64) -> f64 {
    let (tier, fraction) = breakpoints.position(value);
    MIN_RADIUS + RADIUS_STEP * (tier.index() as f64 + fraction)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_radius_is_monotonic_and_continuous() {
        // ---
        let bp = Breakpoints::new(&[15.0, 50.0, 100.0, 150.0]).unwrap();

        let mut last = marker_radius(&bp, 0.0);
        assert_eq!(last, MIN_RADIUS);
        for step in 1..=4_000 {
            let r = marker_radius(&bp, step as f64 * 0.05);
            assert!(r >= last, "radius shrank at {}", step as f64 * 0.05);
            assert!(r - last < 0.1, "radius jumped at {}", step as f64 * 0.05);
            last = r;
        }
    }

    #[test]
    fn test_radius_at_band_edges() {
        // ---
        let bp = Breakpoints::new(&[15.0, 50.0, 100.0, 150.0]).unwrap();

        assert_eq!(marker_radius(&bp, 15.0), MIN_RADIUS + RADIUS_STEP);
        assert_eq!(marker_radius(&bp, 150.0), MIN_RADIUS + 4.0 * RADIUS_STEP);
        assert_eq!(marker_radius(&bp, 10_000.0), MIN_RADIUS + 5.0 * RADIUS_STEP);
    }
}
