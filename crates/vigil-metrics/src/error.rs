//! Error types for vigil-metrics.

use thiserror::Error;

/// Metrics engine configuration errors. Surface at startup only; the
/// running engine never errors, it emits absent values.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for metrics operations.
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;
