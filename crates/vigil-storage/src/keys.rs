//! Hot-store key layout.
//!
//! These key shapes are an external contract: the monitoring UI reads
//! them directly and subscribes to the change topic for invalidations.
//! They must stay bit-exact.

use uuid::Uuid;
use vigil_core::{AlertPriority, InstrumentId, VenueId};

/// `orderbook:{venue}:{instrument}` — latest book state (hash).
pub fn orderbook(venue: VenueId, instrument: &InstrumentId) -> String {
    format!("orderbook:{venue}:{instrument}")
}

/// `zscore:{venue}:{instrument}:{metric}` — rolling buffer (list).
pub fn zscore_buffer(venue: VenueId, instrument: &InstrumentId, metric: &str) -> String {
    format!("zscore:{venue}:{instrument}:{metric}")
}

/// `zscore:current:{venue}:{instrument}` — latest z-scores (hash).
pub fn zscore_current(venue: VenueId, instrument: &InstrumentId) -> String {
    format!("zscore:current:{venue}:{instrument}")
}

/// `alerts:active:{alert_id}` — alert record (hash).
pub fn alert_active(id: Uuid) -> String {
    format!("alerts:active:{id}")
}

/// `alerts:by_instrument:{instrument}` — reverse index (set).
pub fn alerts_by_instrument(instrument: &InstrumentId) -> String {
    format!("alerts:by_instrument:{instrument}")
}

/// `alerts:by_priority:{P1|P2|P3}` — reverse index (set).
pub fn alerts_by_priority(priority: AlertPriority) -> String {
    format!("alerts:by_priority:{priority}")
}

/// `alerts:dedup:{type}:{venue}:{instrument}` — throttle marker (string
/// with TTL).
pub fn alert_dedup(alert_type: &str, venue: VenueId, instrument: &InstrumentId) -> String {
    format!("alerts:dedup:{alert_type}:{venue}:{instrument}")
}

/// `health:{venue}` — health projection (hash).
pub fn health(venue: VenueId) -> String {
    format!("health:{venue}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout_is_bit_exact() {
        let instrument = InstrumentId::new("BTC-USDT");
        assert_eq!(
            orderbook(VenueId::Binance, &instrument),
            "orderbook:binance:BTC-USDT"
        );
        assert_eq!(
            zscore_buffer(VenueId::Okx, &InstrumentId::new("BTC-USDT-PERP"), "spread_bps"),
            "zscore:okx:BTC-USDT-PERP:spread_bps"
        );
        assert_eq!(
            zscore_current(VenueId::Binance, &instrument),
            "zscore:current:binance:BTC-USDT"
        );

        let id = Uuid::nil();
        assert_eq!(
            alert_active(id),
            "alerts:active:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            alerts_by_instrument(&instrument),
            "alerts:by_instrument:BTC-USDT"
        );
        assert_eq!(alerts_by_priority(AlertPriority::P1), "alerts:by_priority:P1");
        assert_eq!(
            alert_dedup("spread_warning", VenueId::Binance, &instrument),
            "alerts:dedup:spread_warning:binance:BTC-USDT"
        );
        assert_eq!(health(VenueId::Okx), "health:okx");
    }
}
