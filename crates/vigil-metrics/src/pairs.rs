//! Paired-metric tracker: basis and cross-venue divergence.
//!
//! Both are the same computation over two mids — basis pairs a perp with
//! its spot leg, divergence pairs the same instrument on two venues. The
//! tracker holds the latest mid per leg and emits whenever either leg
//! updates while both are within the freshness bound.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use vigil_core::{MarketKey, Px};

/// What a pair measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairKind {
    /// left = perp, right = spot; basis = perp_mid - spot_mid.
    Basis,
    /// left = primary venue, right = secondary; same instrument.
    CrossVenue,
}

/// One configured pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSpec {
    pub kind: PairKind,
    /// Perp leg (basis) or primary venue leg (divergence). Emitted
    /// samples are attributed to this key.
    pub left: MarketKey,
    /// Spot leg (basis) or secondary venue leg (divergence); the bps
    /// denominator.
    pub right: MarketKey,
}

/// Output of one pair update.
#[derive(Debug, Clone, PartialEq)]
pub struct PairOutput {
    pub kind: PairKind,
    /// Attribution key (the pair's left leg).
    pub key: MarketKey,
    /// left_mid - right_mid.
    pub abs: Decimal,
    /// In bps relative to the right mid; absent when that mid is zero.
    pub bps: Option<Decimal>,
}

struct MidEntry {
    mid: Px,
    at_mono: Duration,
}

/// Latest-mid tracker over all configured pairs.
pub struct PairTracker {
    specs: Vec<PairSpec>,
    staleness: Duration,
    mids: HashMap<MarketKey, MidEntry>,
}

impl PairTracker {
    pub fn new(specs: Vec<PairSpec>, staleness: Duration) -> Self {
        Self {
            specs,
            staleness,
            mids: HashMap::new(),
        }
    }

    /// Record a new mid and emit every pair output it completes.
    pub fn on_mid(&mut self, key: &MarketKey, mid: Px, now_mono: Duration) -> Vec<PairOutput> {
        self.mids.insert(
            key.clone(),
            MidEntry {
                mid,
                at_mono: now_mono,
            },
        );

        let mut outputs = Vec::new();
        for spec in &self.specs {
            if spec.left != *key && spec.right != *key {
                continue;
            }
            let (Some(left), Some(right)) = (self.mids.get(&spec.left), self.mids.get(&spec.right))
            else {
                continue;
            };
            // Both legs must be fresher than the staleness bound.
            if now_mono.saturating_sub(left.at_mono) > self.staleness
                || now_mono.saturating_sub(right.at_mono) > self.staleness
            {
                continue;
            }

            let abs = left.mid.inner() - right.mid.inner();
            let bps = left.mid.bps_from(right.mid);
            outputs.push(PairOutput {
                kind: spec.kind,
                key: spec.left.clone(),
                abs,
                bps,
            });
        }
        outputs
    }

    /// Forget the mid for one leg (e.g. after a qualifying gap).
    pub fn invalidate(&mut self, key: &MarketKey) {
        self.mids.remove(key);
    }
}
