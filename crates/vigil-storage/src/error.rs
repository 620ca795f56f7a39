//! Error types for vigil-storage.

use thiserror::Error;

/// Storage errors.
///
/// Hot-store failures are absorbed by the writer (buffer + degraded
/// flag); cold-store failures retry and then land in the fallback queue.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hot store error: {0}")]
    HotStore(String),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
