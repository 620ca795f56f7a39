//! Normalized ticker snapshots.
//!
//! Last price and 24h volume come from the ticker stream; mark price, index
//! price, and funding arrive on separate streams for perpetuals and are
//! joined by the adapter before publication.

use crate::decimal::{Px, Qty};
use crate::venue::{InstrumentId, VenueId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized per-venue, per-instrument ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub venue: VenueId,
    pub instrument: InstrumentId,
    pub venue_time: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub last_price: Px,
    /// Exchange fair-value price. Perpetuals only.
    pub mark_price: Option<Px>,
    /// Underlying index price. Perpetuals only.
    pub index_price: Option<Px>,
    pub volume_24h: Qty,
    pub funding_rate: Option<Decimal>,
    pub next_funding_at: Option<DateTime<Utc>>,
}

impl TickerSnapshot {
    /// Mark-index deviation in basis points: (mark - index) / index * 10000.
    ///
    /// Absent unless both mark and index are present and index is non-zero.
    pub fn mark_index_deviation_bps(&self) -> Option<Decimal> {
        let mark = self.mark_price?;
        let index = self.index_price?;
        mark.bps_from(index)
    }

    pub fn market_key(&self) -> crate::venue::MarketKey {
        crate::venue::MarketKey::new(self.venue, self.instrument.clone())
    }
}
