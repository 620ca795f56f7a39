//! Data-gap markers.
//!
//! A gap marker records a window of missing data for one (venue,
//! instrument). Markers are immutable once created and are written to both
//! stores; gap periods are excluded at query time, never backfilled with
//! synthetic values.

use crate::venue::{InstrumentId, VenueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a gap was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// Socket was lost and later re-established.
    Disconnect,
    /// Sequence id went backwards.
    SequenceRegression,
    /// Same sequence id delivered twice.
    Duplicate,
    /// No message for an instrument within the silence threshold.
    Timeout,
    /// Venue-announced maintenance window.
    Maintenance,
}

impl GapReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnect => "disconnect",
            Self::SequenceRegression => "sequence_regression",
            Self::Duplicate => "duplicate",
            Self::Timeout => "timeout",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a window of missing data. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapMarker {
    pub venue: VenueId,
    pub instrument: InstrumentId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reason: GapReason,
    pub seq_before: Option<u64>,
    pub seq_after: Option<u64>,
}

impl GapMarker {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    pub fn market_key(&self) -> crate::venue::MarketKey {
        crate::venue::MarketKey::new(self.venue, self.instrument.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_gap_duration() {
        let start = Utc::now();
        let gap = GapMarker {
            venue: VenueId::Binance,
            instrument: InstrumentId::new("BTC-USDT"),
            started_at: start,
            ended_at: start + Duration::seconds(10),
            reason: GapReason::Disconnect,
            seq_before: Some(100),
            seq_after: Some(250),
        };
        assert_eq!(gap.duration_ms(), 10_000);
    }

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(GapReason::SequenceRegression.as_str(), "sequence_regression");
        assert_eq!(GapReason::Duplicate.as_str(), "duplicate");
    }
}
