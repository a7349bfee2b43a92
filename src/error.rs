//! Error kinds surfaced by the classification engine.

// ---

/// Errors that can arise while configuring the engine or ingesting readings.
///
/// `InvalidReading` and `UnknownParameter` reject a single reading and leave
/// engine state untouched. `Config` is only produced while building an
/// [`EngineConfig`](crate::EngineConfig) and is fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("invalid threshold configuration: {0}")]
    Config(String),

    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Short machine-readable tag, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidReading(_) => "invalid_reading",
            EngineError::UnknownParameter(_) => "unknown_parameter",
            EngineError::Config(_) => "config_error",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Whether the error rejects a single reading rather than the engine.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidReading(_) | EngineError::UnknownParameter(_)
        )
    }
}
