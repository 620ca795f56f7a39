//! Pure order-book math.
//!
//! Everything here is synchronous, allocation-light, and decimal-exact.
//! An empty or one-sided book yields absent values, never zero.

use rust_decimal::Decimal;
use vigil_core::OrderBookSnapshot;

const BPS_SCALE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Absolute spread: best_ask - best_bid.
pub fn spread_abs(book: &OrderBookSnapshot) -> Option<Decimal> {
    let bid = book.best_bid()?;
    let ask = book.best_ask()?;
    Some(ask.price.inner() - bid.price.inner())
}

/// Spread in basis points relative to mid.
pub fn spread_bps(book: &OrderBookSnapshot) -> Option<Decimal> {
    let spread = spread_abs(book)?;
    let mid = book.mid()?;
    if mid.is_zero() {
        return None;
    }
    Some(spread / mid.inner() * BPS_SCALE)
}

/// Depth within one basis-point window of the mid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthWindow {
    pub bid_notional: Decimal,
    pub ask_notional: Decimal,
}

impl DepthWindow {
    pub fn total(&self) -> Decimal {
        self.bid_notional + self.ask_notional
    }
}

/// Notional depth within `n_bps` of the mid, per side.
///
/// Threshold prices are `mid * (1 ± n/10000)`; a bid is included when its
/// price >= the bid threshold, an ask when its price <= the ask threshold.
/// Each included level contributes `price * qty`.
pub fn depth_at_bps(book: &OrderBookSnapshot, n_bps: u32) -> Option<DepthWindow> {
    let mid = book.mid()?.inner();
    let fraction = Decimal::from(n_bps) / BPS_SCALE;
    let bid_threshold = mid * (Decimal::ONE - fraction);
    let ask_threshold = mid * (Decimal::ONE + fraction);

    let bid_notional = book
        .bids
        .iter()
        .take_while(|level| level.price.inner() >= bid_threshold)
        .map(|level| level.notional())
        .sum();
    let ask_notional = book
        .asks
        .iter()
        .take_while(|level| level.price.inner() <= ask_threshold)
        .map(|level| level.notional())
        .sum();

    Some(DepthWindow {
        bid_notional,
        ask_notional,
    })
}

/// Book imbalance at a depth window:
/// (bid_depth - ask_depth) / (bid_depth + ask_depth), in [-1, +1].
///
/// Absent when the denominator is zero.
pub fn imbalance(book: &OrderBookSnapshot, n_bps: u32) -> Option<Decimal> {
    let depth = depth_at_bps(book, n_bps)?;
    let denominator = depth.total();
    if denominator.is_zero() {
        return None;
    }
    Some((depth.bid_notional - depth.ask_notional) / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use vigil_core::{BookLevel, InstrumentId, Px, Qty, SnapshotSource, VenueId};

    fn level(price: Decimal, qty: Decimal) -> BookLevel {
        BookLevel::new(Px::new(price), Qty::new(qty))
    }

    fn book(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> OrderBookSnapshot {
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
    fn test_spread() {
        let b = book(
            vec![level(dec!(100), dec!(1))],
            vec![level(dec!(101), dec!(1))],
        );
        assert_eq!(spread_abs(&b).unwrap(), dec!(1));
        // mid = 100.5; 1 / 100.5 * 10000 ≈ 99.5
        let bps = spread_bps(&b).unwrap();
        assert!(bps > dec!(99) && bps < dec!(100));
    }

    #[test]
    fn test_spread_absent_one_sided() {
        let b = book(vec![level(dec!(100), dec!(1))], vec![]);
        assert!(spread_abs(&b).is_none());
        assert!(spread_bps(&b).is_none());
    }

    #[test]
    fn test_depth_at_bps_inclusion() {
        // mid = 10000; 10 bps window -> bid threshold 9990, ask threshold 10010
        let b = book(
            vec![
                level(dec!(9999), dec!(1)),  // in
                level(dec!(9990), dec!(2)),  // in (boundary inclusive)
                level(dec!(9989), dec!(10)), // out
            ],
            vec![
                level(dec!(10001), dec!(1)),  // in
                level(dec!(10010), dec!(3)),  // in (boundary inclusive)
                level(dec!(10011), dec!(10)), // out
            ],
        );

        let depth = depth_at_bps(&b, 10).unwrap();
        assert_eq!(depth.bid_notional, dec!(9999) + dec!(9990) * dec!(2));
        assert_eq!(depth.ask_notional, dec!(10001) + dec!(10010) * dec!(3));
        assert_eq!(depth.total(), depth.bid_notional + depth.ask_notional);
    }

    #[test]
    fn test_depth_single_level_in_window() {
        let b = book(
            vec![level(dec!(9999), dec!(1))],
            vec![level(dec!(10001), dec!(1))],
        );
        let depth = depth_at_bps(&b, 5).unwrap();
        assert_eq!(depth.bid_notional, dec!(9999));
        assert_eq!(depth.ask_notional, dec!(10001));
    }

    #[test]
    fn test_depth_wider_window_includes_more() {
        let b = book(
            vec![level(dec!(9999), dec!(1)), level(dec!(9980), dec!(1))],
            vec![level(dec!(10001), dec!(1)), level(dec!(10020), dec!(1))],
        );
        let narrow = depth_at_bps(&b, 5).unwrap();
        let wide = depth_at_bps(&b, 25).unwrap();
        assert!(wide.bid_notional > narrow.bid_notional);
        assert!(wide.ask_notional > narrow.ask_notional);
    }

    #[test]
    fn test_imbalance_range_and_sign() {
        // Bid-heavy book -> positive imbalance.
        let b = book(
            vec![level(dec!(9999), dec!(3))],
            vec![level(dec!(10001), dec!(1))],
        );
        let value = imbalance(&b, 10).unwrap();
        assert!(value > Decimal::ZERO && value <= Decimal::ONE);

        // Ask-heavy book -> negative imbalance.
        let b = book(
            vec![level(dec!(9999), dec!(1))],
            vec![level(dec!(10001), dec!(3))],
        );
        let value = imbalance(&b, 10).unwrap();
        assert!(value < Decimal::ZERO && value >= -Decimal::ONE);
    }

    #[test]
    fn test_imbalance_absent_when_window_empty() {
        // Levels exist but both fall outside the 10 bps window.
        let b = book(
            vec![level(dec!(9900), dec!(1))],
            vec![level(dec!(10100), dec!(1))],
        );
        assert!(imbalance(&b, 10).is_none());
    }

    #[test]
    fn test_empty_book_all_absent() {
        let b = book(vec![], vec![]);
        assert!(spread_abs(&b).is_none());
        assert!(depth_at_bps(&b, 10).is_none());
        assert!(imbalance(&b, 10).is_none());
    }
}
