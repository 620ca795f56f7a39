//! Venue parser contract.
//!
//! A venue module implements [`vigil_ws::WireProtocol`] (transport shape)
//! and [`VenueParser`] (payload decoding). Everything emitted here is
//! already validated and normalized; nothing venue-specific leaves this
//! crate.

use crate::error::{VenueError, VenueResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use vigil_core::{BookLevel, InstrumentId, OrderBookSnapshot, Px, Qty, VenueId};

/// Partial ticker update from one of the joined streams (ticker, mark
/// price, index price, funding). Fields that a stream does not carry are
/// `None`; the adapter merges updates per instrument.
#[derive(Debug, Clone)]
pub struct TickerUpdate {
    pub instrument: InstrumentId,
    pub venue_time: DateTime<Utc>,
    pub last_price: Option<Px>,
    pub mark_price: Option<Px>,
    pub index_price: Option<Px>,
    pub volume_24h: Option<Qty>,
    pub funding_rate: Option<Decimal>,
    pub next_funding_at: Option<DateTime<Utc>>,
}

impl TickerUpdate {
    pub fn empty(instrument: InstrumentId, venue_time: DateTime<Utc>) -> Self {
        Self {
            instrument,
            venue_time,
            last_price: None,
            mark_price: None,
            index_price: None,
            volume_24h: None,
            funding_rate: None,
            next_funding_at: None,
        }
    }
}

/// One decoded wire message.
#[derive(Debug, Clone)]
pub enum VenueEvent {
    Book(OrderBookSnapshot),
    Ticker(TickerUpdate),
}

/// Decodes venue frames into normalized events.
pub trait VenueParser: Send + Sync + 'static {
    fn venue(&self) -> VenueId;

    /// Decode one text frame. A frame may carry zero or more events
    /// (subscription acks decode to an empty vec). Errors drop the frame;
    /// they never kill the stream.
    fn parse(&self, text: &str, received_at: DateTime<Utc>) -> VenueResult<Vec<VenueEvent>>;
}

/// Parse `[["price","qty"], ...]` wire levels through decimal parsing.
/// Levels with zero quantity are dropped (venues use them as tombstones).
pub fn parse_levels(raw: &[Vec<String>]) -> VenueResult<Vec<BookLevel>> {
    let mut levels = Vec::with_capacity(raw.len());
    for entry in raw {
        let [price, qty] = entry.as_slice() else {
            return Err(VenueError::MalformedFrame(format!(
                "level with {} fields",
                entry.len()
            )));
        };
        let price: Px = price.parse()?;
        let qty: Qty = qty.parse()?;
        if qty.is_zero() {
            continue;
        }
        levels.push(BookLevel::new(price, qty));
    }
    Ok(levels)
}

/// Epoch-milliseconds timestamp from the wire.
pub fn ts_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_levels() {
        let raw = vec![
            vec!["100.5".to_string(), "1.25".to_string()],
            vec!["100.4".to_string(), "0".to_string()], // tombstone
            vec!["100.3".to_string(), "2".to_string()],
        ];
        let levels = parse_levels(&raw).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].price.inner(), dec!(100.5));
        assert_eq!(levels[1].qty.inner(), dec!(2));
    }

    #[test]
    fn test_parse_levels_rejects_garbage() {
        let raw = vec![vec!["not-a-price".to_string(), "1".to_string()]];
        assert!(parse_levels(&raw).is_err());

        let raw = vec![vec!["100".to_string()]];
        assert!(parse_levels(&raw).is_err());
    }
}
