//! Core domain types for the vigil surveillance pipeline.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `MarketKey`: unique identifier for a (venue, instrument) stream
//! - `Px`, `Qty`: precision-safe decimal types
//! - `OrderBookSnapshot`, `TickerSnapshot`: normalized market data
//! - `GapMarker`: immutable record of missing data
//! - `MetricSample`, `MetricName`: derived microstructure metrics
//! - `Alert` and friends: the alert lifecycle record
//! - `Clock`: injectable monotonic/wall clock

pub mod alert;
pub mod book;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod gap;
pub mod health;
pub mod metric;
pub mod ticker;
pub mod venue;

pub use alert::{
    Alert, AlertDefinition, AlertEvent, AlertPriority, AlertSeverity, AlertTransition, Comparison,
    ResolutionType, SkipReason, Threshold, ThresholdBook,
};
pub use book::{BookLevel, BookRejection, OrderBookSnapshot, SnapshotSource};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use decimal::{Px, Qty};
pub use error::{CoreError, Result};
pub use gap::{GapMarker, GapReason};
pub use health::{HealthSnapshot, VenueStatus};
pub use metric::{MetricName, MetricSample};
pub use ticker::TickerSnapshot;
pub use venue::{InstrumentId, MarketKey, VenueId};
