//! Venue and instrument identification types.
//!
//! Every stream in the pipeline is keyed by `(venue, instrument)`. Venue
//! symbols ("BTCUSDT", "BTC-USDT-SWAP") are translated to a normalized
//! instrument id by the adapters; everything downstream only ever sees the
//! normalized form.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Binance,
    Okx,
}

impl VenueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Okx => "okx",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binance" => Ok(Self::Binance),
            "okx" => Ok(Self::Okx),
            other => Err(CoreError::UnknownVenue(other.to_string())),
        }
    }
}

/// Normalized instrument identifier.
///
/// Format: `BASE-QUOTE` for spot (e.g. "BTC-USDT") and `BASE-QUOTE-PERP`
/// for perpetuals. Venue-specific symbols never appear past the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a perpetual instrument.
    pub fn is_perp(&self) -> bool {
        self.0.ends_with("-PERP")
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique market identifier combining venue and instrument.
///
/// Primary key for per-stream state: sequence guards, z-score states,
/// persistence cells, and active alerts are all scoped to one `MarketKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub venue: VenueId,
    pub instrument: InstrumentId,
}

impl MarketKey {
    pub fn new(venue: VenueId, instrument: InstrumentId) -> Self {
        Self { venue, instrument }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.instrument)
    }
}
