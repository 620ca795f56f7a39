//! Error types for vigil-venue.

use thiserror::Error;

/// Venue adapter errors.
///
/// Parse and validation failures are per-message: the message is dropped
/// and logged, the stream continues. Transport failures surface through
/// vigil-ws and drive reconnection.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decimal parse error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Rejected book: {0}")]
    RejectedBook(#[from] vigil_core::BookRejection),

    #[error("REST poll failed: {0}")]
    Rest(#[from] reqwest::Error),

    #[error("Venue-reported error: {0}")]
    VenueReported(String),
}

/// Result type alias for venue operations.
pub type VenueResult<T> = std::result::Result<T, VenueError>;
