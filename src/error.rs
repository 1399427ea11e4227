//! Error taxonomy for the impact engine
//!
//! Provider-layer errors (`NotFound`, `Provider`) bubble to the caller unchanged.
//! Statistical edge cases are normally recovered locally into degraded results
//! with warnings; the variants here are what remains when recovery is not
//! possible or the caller asked for something malformed.

use thiserror::Error;

/// Errors produced by the impact engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImpactError {
    /// Malformed options: empty field list, threshold outside `[0, 1]`, ...
    #[error("Invalid options: {0}")]
    Validation(String),

    /// Sample below the minimum an analysis needs
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Unknown event or entity
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Numerical instability that could not be guarded locally
    #[error("Numerical computation failed: {0}")]
    Computation(String),

    /// Unknown correction, decay, test or interval method name
    #[error("Unsupported {kind} method: {name}")]
    UnsupportedMethod { kind: &'static str, name: String },

    /// Failure reported by the external data source
    #[error("Data provider error: {0}")]
    Provider(String),

    /// A resampling loop observed its cancellation flag
    #[error("Resampling cancelled before completing {requested} iterations")]
    Cancelled { requested: usize },

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ImpactError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn unsupported(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            kind,
            name: name.into(),
        }
    }

    /// Whether this error originated outside the engine (provider layer)
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Provider(_))
    }
}

/// Result type for impact engine operations
pub type Result<T> = std::result::Result<T, ImpactError>;
