//! Venue and instrument configuration.
//!
//! These are frozen documents handed to the adapter at construction; the
//! adapter never watches files or reloads.

use serde::{Deserialize, Serialize};
use vigil_core::{InstrumentId, VenueId};
use vigil_ws::BackoffPolicy;

/// Reconnection backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Attempts before degraded mode (0 = never degrade).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(cfg: &BackoffConfig) -> Self {
        Self {
            base_delay_ms: cfg.base_delay_ms,
            max_delay_ms: cfg.max_delay_ms,
            max_attempts: cfg.max_attempts,
        }
    }
}

/// One instrument to watch on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Normalized id, e.g. "BTC-USDT-PERP".
    pub id: InstrumentId,
    /// Venue-native symbol, e.g. "BTCUSDT" or "BTC-USDT-SWAP".
    pub venue_symbol: String,
    /// Venue stream/channel names to subscribe for this instrument.
    pub streams: Vec<String>,
    /// Depth levels captured per side.
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,
}

fn default_depth_levels() -> usize {
    20
}

/// Per-venue adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub venue: VenueId,
    pub ws_url: String,
    pub rest_url: String,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Keep-alive ping cadence.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Pong deadline after a ping.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
    /// Silence threshold for time-based gaps.
    #[serde(default = "default_silence_gap_ms")]
    pub silence_gap_ms: u64,
    /// Poll cadence while degraded.
    #[serde(default = "default_rest_poll_interval_ms")]
    pub rest_poll_interval_ms: u64,
    pub instruments: Vec<InstrumentSpec>,
}

fn default_ping_interval_ms() -> u64 {
    20_000
}

fn default_pong_timeout_ms() -> u64 {
    10_000
}

fn default_silence_gap_ms() -> u64 {
    5_000
}

fn default_rest_poll_interval_ms() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_toml() {
        let cfg: VenueConfig = toml::from_str(
            r#"
            venue = "okx"
            ws_url = "wss://ws.okx.com:8443/ws/v5/public"
            rest_url = "https://www.okx.com"

            [[instruments]]
            id = "BTC-USDT-PERP"
            venue_symbol = "BTC-USDT-SWAP"
            streams = ["books5", "tickers", "mark-price", "index-tickers", "funding-rate"]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.venue, VenueId::Okx);
        assert_eq!(cfg.silence_gap_ms, 5_000);
        assert_eq!(cfg.rest_poll_interval_ms, 1_000);
        assert_eq!(cfg.instruments[0].depth_levels, 20);
    }
}
