//! Application errors and exit codes.

use thiserror::Error;

/// Top-level application errors. Each maps to a process exit code:
/// 0 clean shutdown, 1 invalid configuration, 2 dependency unavailable at
/// startup, 3 unrecoverable I/O past the retry budget.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Unrecoverable I/O error: {0}")]
    Io(String),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::DependencyUnavailable(_) => 2,
            Self::Io(_) => 3,
        }
    }
}

impl From<vigil_detector::DetectorError> for AppError {
    fn from(e: vigil_detector::DetectorError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<vigil_metrics::MetricsError> for AppError {
    fn from(e: vigil_metrics::MetricsError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type alias for application operations.
pub type AppResult<T> = std::result::Result<T, AppError>;
