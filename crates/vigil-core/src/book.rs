//! Normalized order-book snapshots.
//!
//! Adapters convert venue wire formats into `OrderBookSnapshot` and validate
//! them before publication. A snapshot that fails validation is dropped and
//! logged; it never reaches the metrics engine.

use crate::decimal::{Px, Qty};
use crate::venue::{InstrumentId, VenueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Px,
    pub qty: Qty,
}

impl BookLevel {
    pub fn new(price: Px, qty: Qty) -> Self {
        Self { price, qty }
    }

    /// Notional value of this level.
    pub fn notional(&self) -> rust_decimal::Decimal {
        self.qty.notional(self.price)
    }
}

/// Where a snapshot came from.
///
/// REST-polled snapshots (degraded mode) are excluded from latency
/// measurements downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Stream,
    RestPoll,
}

/// Normalized per-venue, per-instrument order book.
///
/// Invariants (enforced by [`OrderBookSnapshot::validate`]):
/// - best bid < best ask when both sides are present
/// - all prices and quantities are strictly positive
/// - bids strictly descending, asks strictly ascending in price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub venue: VenueId,
    pub instrument: InstrumentId,
    /// Venue-assigned event timestamp.
    pub venue_time: DateTime<Utc>,
    /// Local receive timestamp.
    pub received_at: DateTime<Utc>,
    /// Canonicalized venue sequence number.
    pub sequence_id: u64,
    /// Bids, highest price first.
    pub bids: Vec<BookLevel>,
    /// Asks, lowest price first.
    pub asks: Vec<BookLevel>,
    /// Number of levels captured per side at subscription time.
    pub depth_levels: usize,
    pub source: SnapshotSource,
}

/// Why a snapshot was rejected during validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookRejection {
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Px, ask: Px },

    #[error("non-positive price {0}")]
    NonPositivePrice(Px),

    #[error("non-positive quantity {0}")]
    NonPositiveQty(Qty),

    #[error("bids not strictly descending at level {0}")]
    UnsortedBids(usize),

    #[error("asks not strictly ascending at level {0}")]
    UnsortedAsks(usize),
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Mid price: (best_bid + best_ask) / 2.
    ///
    /// Absent unless both sides have at least one level.
    pub fn mid(&self) -> Option<Px> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(Px::mid(bid.price, ask.price))
    }

    pub fn market_key(&self) -> crate::venue::MarketKey {
        crate::venue::MarketKey::new(self.venue, self.instrument.clone())
    }

    /// Validate book invariants.
    ///
    /// An empty side is allowed (dependent metrics are simply absent); a
    /// crossed, unsorted, or non-positive book is not.
    pub fn validate(&self) -> Result<(), BookRejection> {
        for side in [&self.bids, &self.asks] {
            for level in side {
                if !level.price.is_positive() {
                    return Err(BookRejection::NonPositivePrice(level.price));
                }
                if !level.qty.is_positive() {
                    return Err(BookRejection::NonPositiveQty(level.qty));
                }
            }
        }

        for (i, pair) in self.bids.windows(2).enumerate() {
            if pair[1].price >= pair[0].price {
                return Err(BookRejection::UnsortedBids(i + 1));
            }
        }
        for (i, pair) in self.asks.windows(2).enumerate() {
            if pair[1].price <= pair[0].price {
                return Err(BookRejection::UnsortedAsks(i + 1));
            }
        }

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price >= ask.price {
                return Err(BookRejection::Crossed {
                    bid: bid.price,
                    ask: ask.price,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: rust_decimal::Decimal, qty: rust_decimal::Decimal) -> BookLevel {
        BookLevel::new(Px::new(price), Qty::new(qty))
    }

    fn snapshot(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: VenueId::Binance,
            instrument: InstrumentId::new("BTC-USDT"),
            venue_time: Utc::now(),
            received_at: Utc::now(),
            sequence_id: 1,
            bids,
            asks,
            depth_levels: 20,
            source: SnapshotSource::Stream,
        }
    }

    #[test]
    fn test_valid_book() {
        let book = snapshot(
            vec![level(dec!(100), dec!(1)), level(dec!(99.5), dec!(2))],
            vec![level(dec!(100.5), dec!(1)), level(dec!(101), dec!(3))],
        );
        assert!(book.validate().is_ok());
        assert_eq!(book.mid().unwrap().inner(), dec!(100.25));
    }

    #[test]
    fn test_crossed_book_rejected() {
        let book = snapshot(
            vec![level(dec!(101), dec!(1))],
            vec![level(dec!(100), dec!(1))],
        );
        assert!(matches!(
            book.validate(),
            Err(BookRejection::Crossed { .. })
        ));
    }

    #[test]
    fn test_locked_book_rejected() {
        // bid == ask is also a crossed book
        let book = snapshot(
            vec![level(dec!(100), dec!(1))],
            vec![level(dec!(100), dec!(1))],
        );
        assert!(matches!(
            book.validate(),
            Err(BookRejection::Crossed { .. })
        ));
    }

    #[test]
    fn test_zero_price_rejected() {
        let book = snapshot(vec![level(dec!(0), dec!(1))], vec![]);
        assert!(matches!(
            book.validate(),
            Err(BookRejection::NonPositivePrice(_))
        ));
    }

    #[test]
    fn test_zero_qty_rejected() {
        let book = snapshot(vec![level(dec!(100), dec!(0))], vec![]);
        assert!(matches!(
            book.validate(),
            Err(BookRejection::NonPositiveQty(_))
        ));
    }

    #[test]
    fn test_unsorted_bids_rejected() {
        let book = snapshot(
            vec![level(dec!(99), dec!(1)), level(dec!(100), dec!(1))],
            vec![level(dec!(101), dec!(1))],
        );
        assert_eq!(book.validate(), Err(BookRejection::UnsortedBids(1)));
    }

    #[test]
    fn test_duplicate_ask_level_rejected() {
        let book = snapshot(
            vec![level(dec!(99), dec!(1))],
            vec![level(dec!(101), dec!(1)), level(dec!(101), dec!(2))],
        );
        assert_eq!(book.validate(), Err(BookRejection::UnsortedAsks(1)));
    }

    #[test]
    fn test_empty_book_is_valid_but_mid_absent() {
        let book = snapshot(vec![], vec![]);
        assert!(book.validate().is_ok());
        assert!(book.mid().is_none());
    }

    #[test]
    fn test_one_sided_book_mid_absent() {
        let book = snapshot(vec![level(dec!(100), dec!(1))], vec![]);
        assert!(book.validate().is_ok());
        assert!(book.mid().is_none());
    }
}
