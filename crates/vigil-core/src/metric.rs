//! Metric identities and samples.
//!
//! `MetricName` is the closed set of microstructure metrics the engine can
//! produce. The snake_case wire names are part of the hot-store key contract
//! and the cold-store schema; change them and the UI breaks.

use crate::book::SnapshotSource;
use crate::error::CoreError;
use crate::venue::{InstrumentId, MarketKey, VenueId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a derived metric. Depth metrics are parameterized by their
/// basis-point window (5, 10, 25 by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricName {
    SpreadAbs,
    SpreadBps,
    DepthBid(u32),
    DepthAsk(u32),
    DepthTotal(u32),
    /// Book imbalance at the 10 bps window.
    Imbalance,
    BasisAbs,
    BasisBps,
    MarkIndexDevBps,
    DivergenceBps,
    /// Gap duration in seconds; synthesized from gap markers so data_gap
    /// alerts ride the normal evaluation path.
    GapSeconds,
}

impl MetricName {
    /// Canonical wire name, e.g. `spread_bps`, `depth_bid_10bps`.
    pub fn wire_name(&self) -> String {
        match self {
            Self::SpreadAbs => "spread_abs".to_string(),
            Self::SpreadBps => "spread_bps".to_string(),
            Self::DepthBid(n) => format!("depth_bid_{n}bps"),
            Self::DepthAsk(n) => format!("depth_ask_{n}bps"),
            Self::DepthTotal(n) => format!("depth_total_{n}bps"),
            Self::Imbalance => "imbalance".to_string(),
            Self::BasisAbs => "basis_abs".to_string(),
            Self::BasisBps => "basis_bps".to_string(),
            Self::MarkIndexDevBps => "mark_index_dev_bps".to_string(),
            Self::DivergenceBps => "divergence_bps".to_string(),
            Self::GapSeconds => "gap_seconds".to_string(),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

impl FromStr for MetricName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn depth_window(s: &str, prefix: &str) -> Option<u32> {
            s.strip_prefix(prefix)?.strip_suffix("bps")?.parse().ok()
        }

        match s {
            "spread_abs" => Ok(Self::SpreadAbs),
            "spread_bps" => Ok(Self::SpreadBps),
            "imbalance" => Ok(Self::Imbalance),
            "basis_abs" => Ok(Self::BasisAbs),
            "basis_bps" => Ok(Self::BasisBps),
            "mark_index_dev_bps" => Ok(Self::MarkIndexDevBps),
            "divergence_bps" => Ok(Self::DivergenceBps),
            "gap_seconds" => Ok(Self::GapSeconds),
            other => depth_window(other, "depth_bid_")
                .map(Self::DepthBid)
                .or_else(|| depth_window(other, "depth_ask_").map(Self::DepthAsk))
                .or_else(|| depth_window(other, "depth_total_").map(Self::DepthTotal))
                .ok_or_else(|| CoreError::UnknownMetric(other.to_string())),
        }
    }
}

/// One metric observation.
///
/// `zscore` is `None` while the z-score engine is warming up or guarded;
/// absence is distinguishable from the value zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric: MetricName,
    pub venue: VenueId,
    pub instrument: InstrumentId,
    pub ts: DateTime<Utc>,
    pub value: Decimal,
    pub zscore: Option<Decimal>,
    pub source: SnapshotSource,
}

impl MetricSample {
    pub fn market_key(&self) -> MarketKey {
        MarketKey::new(self.venue, self.instrument.clone())
    }
}
