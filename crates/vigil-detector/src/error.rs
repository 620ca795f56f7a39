//! Error types for vigil-detector.

use thiserror::Error;

/// Detector errors. Configuration errors surface at startup; runtime
/// evaluation problems become `skip=evaluation_error`, never an `Err`.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for detector operations.
pub type DetectorResult<T> = std::result::Result<T, DetectorError>;
