//! Metrics engine.
//!
//! Derives every per-snapshot, paired, and ticker metric from normalized
//! inputs and attaches rolling z-scores to the statistically tracked ones.
//! The engine is synchronous and owned by a single task; it also consumes
//! gap markers so z-score resets stay ordered with samples.

use crate::book_math;
use crate::pairs::{PairKind, PairSpec, PairTracker};
use crate::zscore::{ZScoreConfig, ZScoreEngine, ZScoreStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use vigil_core::{
    GapMarker, InstrumentId, MarketKey, MetricName, MetricSample, OrderBookSnapshot, SharedClock,
    SnapshotSource, TickerSnapshot, VenueId,
};

/// Metrics engine configuration, assembled by the pipeline from the
/// frozen feature-flag document.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Depth windows in bps.
    pub depth_windows_bps: Vec<u32>,
    /// Window for the imbalance metric.
    pub imbalance_window_bps: u32,
    /// Freshness bound for both legs of a pair.
    pub pair_staleness_ms: u64,
    /// Metrics that get a rolling z-score attached.
    pub tracked: HashSet<MetricName>,
    pub zscore: ZScoreConfig,
    pub pairs: Vec<PairSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            depth_windows_bps: vec![5, 10, 25],
            imbalance_window_bps: 10,
            pair_staleness_ms: 5_000,
            tracked: HashSet::from([
                MetricName::SpreadBps,
                MetricName::Imbalance,
                MetricName::BasisBps,
                MetricName::MarkIndexDevBps,
                MetricName::DivergenceBps,
            ]),
            zscore: ZScoreConfig::default(),
            pairs: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Startup validation. An invalid document refuses to start.
    pub fn validate(&self) -> crate::error::MetricsResult<()> {
        use crate::error::MetricsError;

        if self.depth_windows_bps.is_empty() {
            return Err(MetricsError::InvalidConfig(
                "at least one depth window is required".to_string(),
            ));
        }
        if self.zscore.window_size < self.zscore.min_samples {
            return Err(MetricsError::InvalidConfig(format!(
                "window_size {} < min_samples {}",
                self.zscore.window_size, self.zscore.min_samples
            )));
        }
        if self.zscore.min_samples < 2 {
            return Err(MetricsError::InvalidConfig(
                "min_samples must be at least 2".to_string(),
            ));
        }
        if self.zscore.min_std <= Decimal::ZERO {
            return Err(MetricsError::InvalidConfig(
                "min_std must be positive".to_string(),
            ));
        }
        if self.pair_staleness_ms == 0 {
            return Err(MetricsError::InvalidConfig(
                "pair_staleness_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Converts snapshots into metric samples.
pub struct MetricsEngine {
    config: EngineConfig,
    zscores: ZScoreEngine,
    pairs: PairTracker,
    clock: SharedClock,
}

impl MetricsEngine {
    pub fn new(config: EngineConfig, clock: SharedClock) -> Self {
        let zscores = ZScoreEngine::new(config.zscore.clone());
        let pairs = PairTracker::new(
            config.pairs.clone(),
            Duration::from_millis(config.pair_staleness_ms),
        );
        Self {
            config,
            zscores,
            pairs,
            clock,
        }
    }

    /// Derive all metrics for one order-book snapshot.
    pub fn on_book(&mut self, book: &OrderBookSnapshot) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        let ts = book.received_at;
        let venue = book.venue;
        let instrument = &book.instrument;
        let source = book.source;

        if let Some(value) = book_math::spread_abs(book) {
            samples.push(self.sample(MetricName::SpreadAbs, venue, instrument, ts, value, source));
        }
        if let Some(value) = book_math::spread_bps(book) {
            samples.push(self.sample(MetricName::SpreadBps, venue, instrument, ts, value, source));
        }

        let depth_windows_bps = self.config.depth_windows_bps.clone();
        for window in depth_windows_bps {
            let Some(depth) = book_math::depth_at_bps(book, window) else {
                continue;
            };
            samples.push(self.sample(
                MetricName::DepthBid(window),
                venue,
                instrument,
                ts,
                depth.bid_notional,
                source,
            ));
            samples.push(self.sample(
                MetricName::DepthAsk(window),
                venue,
                instrument,
                ts,
                depth.ask_notional,
                source,
            ));
            samples.push(self.sample(
                MetricName::DepthTotal(window),
                venue,
                instrument,
                ts,
                depth.total(),
                source,
            ));
        }

        if let Some(value) = book_math::imbalance(book, self.config.imbalance_window_bps) {
            samples.push(self.sample(MetricName::Imbalance, venue, instrument, ts, value, source));
        }

        if let Some(mid) = book.mid() {
            let key = book.market_key();
            let now_mono = self.clock.mono();
            for output in self.pairs.on_mid(&key, mid, now_mono) {
                samples.extend(self.pair_samples(output, ts, source));
            }
        }

        samples
    }

    /// Derive ticker metrics (mark-index deviation).
    pub fn on_ticker(&mut self, ticker: &TickerSnapshot) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        if let Some(value) = ticker.mark_index_deviation_bps() {
            samples.push(self.sample(
                MetricName::MarkIndexDevBps,
                ticker.venue,
                &ticker.instrument,
                ticker.received_at,
                value,
                SnapshotSource::Stream,
            ));
        }
        samples
    }

    /// Consume a gap marker. Returns true when the gap was long enough to
    /// reset the market's z-score states and pair legs.
    pub fn on_gap(&mut self, gap: &GapMarker) -> bool {
        if gap.duration_ms() < self.config.zscore.reset_on_gap_ms {
            debug!(
                venue = %gap.venue,
                instrument = %gap.instrument,
                duration_ms = gap.duration_ms(),
                "Gap below reset threshold"
            );
            return false;
        }
        self.zscores
            .reset_market(gap.venue, &gap.instrument, gap.reason.as_str());
        self.pairs.invalidate(&gap.market_key());
        true
    }

    /// Z-score status projection for the UI.
    pub fn zscore_status(
        &self,
        metric: MetricName,
        venue: VenueId,
        instrument: &InstrumentId,
    ) -> Option<ZScoreStatus> {
        self.zscores.status(metric, venue, instrument)
    }

    /// Drop state for an unsubscribed market.
    pub fn drop_market(&mut self, venue: VenueId, instrument: &InstrumentId) {
        self.zscores.drop_market(venue, instrument);
        self.pairs
            .invalidate(&MarketKey::new(venue, instrument.clone()));
    }

    fn pair_samples(
        &mut self,
        output: crate::pairs::PairOutput,
        ts: DateTime<Utc>,
        source: SnapshotSource,
    ) -> Vec<MetricSample> {
        let venue = output.key.venue;
        let instrument = output.key.instrument.clone();
        let mut samples = Vec::new();
        match output.kind {
            PairKind::Basis => {
                samples.push(self.sample(
                    MetricName::BasisAbs,
                    venue,
                    &instrument,
                    ts,
                    output.abs,
                    source,
                ));
                if let Some(bps) = output.bps {
                    samples.push(self.sample(
                        MetricName::BasisBps,
                        venue,
                        &instrument,
                        ts,
                        bps,
                        source,
                    ));
                }
            }
            PairKind::CrossVenue => {
                if let Some(bps) = output.bps {
                    samples.push(self.sample(
                        MetricName::DivergenceBps,
                        venue,
                        &instrument,
                        ts,
                        bps,
                        source,
                    ));
                }
            }
        }
        samples
    }

    /// Build one sample, attaching a z-score when the metric is tracked.
    fn sample(
        &mut self,
        metric: MetricName,
        venue: VenueId,
        instrument: &InstrumentId,
        ts: DateTime<Utc>,
        value: Decimal,
        source: SnapshotSource,
    ) -> MetricSample {
        let zscore = if self.config.tracked.contains(&metric) {
            self.zscores
                .add_sample(metric, venue, instrument, value, self.clock.mono())
        } else {
            None
        };
        MetricSample {
            metric,
            venue,
            instrument: instrument.clone(),
            ts,
            value,
            zscore,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use vigil_core::{BookLevel, GapReason, ManualClock, Px, Qty};

    fn clock() -> Arc<ManualClock> {
        ManualClock::shared(Utc::now())
    }

    fn book_at(
        venue: VenueId,
        instrument: &str,
        bid: Decimal,
        ask: Decimal,
        seq: u64,
        received_at: DateTime<Utc>,
    ) -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue,
            instrument: InstrumentId::new(instrument),
            venue_time: received_at,
            received_at,
            sequence_id: seq,
            bids: vec![BookLevel::new(Px::new(bid), Qty::new(dec!(1)))],
            asks: vec![BookLevel::new(Px::new(ask), Qty::new(dec!(1)))],
            depth_levels: 20,
            source: SnapshotSource::Stream,
        }
    }

    fn find(samples: &[MetricSample], metric: MetricName) -> Option<&MetricSample> {
        samples.iter().find(|s| s.metric == metric)
    }

    #[test]
    fn test_book_metric_set() {
        let clock = clock();
        let mut engine = MetricsEngine::new(EngineConfig::default(), clock);

        let samples = engine.on_book(&book_at(
            VenueId::Binance,
            "BTC-USDT",
            dec!(9999),
            dec!(10001),
            1,
            Utc::now(),
        ));

        assert!(find(&samples, MetricName::SpreadAbs).is_some());
        assert!(find(&samples, MetricName::SpreadBps).is_some());
        assert!(find(&samples, MetricName::Imbalance).is_some());
        for window in [5, 10, 25] {
            assert!(find(&samples, MetricName::DepthBid(window)).is_some());
            assert!(find(&samples, MetricName::DepthAsk(window)).is_some());
            assert!(find(&samples, MetricName::DepthTotal(window)).is_some());
        }

        let spread = find(&samples, MetricName::SpreadAbs).unwrap();
        assert_eq!(spread.value, dec!(2));
        // First sample: z-score warming up.
        let spread_bps = find(&samples, MetricName::SpreadBps).unwrap();
        assert!(spread_bps.zscore.is_none());
    }

    #[test]
    fn test_empty_book_yields_nothing() {
        let clock = clock();
        let mut engine = MetricsEngine::new(EngineConfig::default(), clock);
        let mut book = book_at(
            VenueId::Binance,
            "BTC-USDT",
            dec!(1),
            dec!(2),
            1,
            Utc::now(),
        );
        book.bids.clear();
        book.asks.clear();
        assert!(engine.on_book(&book).is_empty());
    }

    #[test]
    fn test_untracked_metric_never_gets_zscore() {
        let clock = clock();
        let mut engine = MetricsEngine::new(
            EngineConfig {
                zscore: ZScoreConfig {
                    min_samples: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
            clock.clone(),
        );

        for i in 0..20u64 {
            clock.advance_secs(1);
            let samples = engine.on_book(&book_at(
                VenueId::Binance,
                "BTC-USDT",
                dec!(9999) + Decimal::from(i),
                dec!(10001) + Decimal::from(i * 2),
                i,
                Utc::now(),
            ));
            // Depth is not in the tracked set.
            let depth = find(&samples, MetricName::DepthTotal(10)).unwrap();
            assert!(depth.zscore.is_none());
        }

        // Tracked spread did warm up over the same stretch.
        let status = engine
            .zscore_status(
                MetricName::SpreadBps,
                VenueId::Binance,
                &InstrumentId::new("BTC-USDT"),
            )
            .unwrap();
        assert!(status.warmed_up);
    }

    #[test]
    fn test_basis_pair_through_books() {
        let clock = clock();
        let perp = MarketKey::new(VenueId::Okx, InstrumentId::new("BTC-USDT-PERP"));
        let spot = MarketKey::new(VenueId::Binance, InstrumentId::new("BTC-USDT"));
        let mut engine = MetricsEngine::new(
            EngineConfig {
                pairs: vec![PairSpec {
                    kind: PairKind::Basis,
                    left: perp.clone(),
                    right: spot,
                }],
                ..Default::default()
            },
            clock,
        );

        // Spot leg first: no basis yet.
        let samples = engine.on_book(&book_at(
            VenueId::Binance,
            "BTC-USDT",
            dec!(49999),
            dec!(50001),
            1,
            Utc::now(),
        ));
        assert!(find(&samples, MetricName::BasisAbs).is_none());

        // Perp leg completes the pair; basis attributed to the perp key.
        let samples = engine.on_book(&book_at(
            VenueId::Okx,
            "BTC-USDT-PERP",
            dec!(50099),
            dec!(50101),
            1,
            Utc::now(),
        ));
        let basis = find(&samples, MetricName::BasisAbs).unwrap();
        assert_eq!(basis.value, dec!(100));
        assert_eq!(basis.venue, VenueId::Okx);
        assert_eq!(basis.instrument, perp.instrument);
        assert!(find(&samples, MetricName::BasisBps).is_some());
    }

    #[test]
    fn test_ticker_mark_index_metric() {
        let clock = clock();
        let mut engine = MetricsEngine::new(EngineConfig::default(), clock);
        let ticker = TickerSnapshot {
            venue: VenueId::Okx,
            instrument: InstrumentId::new("BTC-USDT-PERP"),
            venue_time: Utc::now(),
            received_at: Utc::now(),
            last_price: Px::new(dec!(50000)),
            mark_price: Some(Px::new(dec!(50050))),
            index_price: Some(Px::new(dec!(50000))),
            volume_24h: Qty::new(dec!(1000)),
            funding_rate: None,
            next_funding_at: None,
        };

        let samples = engine.on_ticker(&ticker);
        let dev = find(&samples, MetricName::MarkIndexDevBps).unwrap();
        assert_eq!(dev.value, dec!(10));
    }

    #[test]
    fn test_gap_reset_threshold() {
        let clock = clock();
        let mut engine = MetricsEngine::new(EngineConfig::default(), clock.clone());
        let instrument = InstrumentId::new("BTC-USDT");

        // Warm some state.
        for i in 0..40u64 {
            clock.advance_secs(1);
            engine.on_book(&book_at(
                VenueId::Binance,
                "BTC-USDT",
                dec!(9999) + Decimal::from(i % 7),
                dec!(10001) + Decimal::from(i % 5),
                i,
                Utc::now(),
            ));
        }
        let status = engine
            .zscore_status(MetricName::SpreadBps, VenueId::Binance, &instrument)
            .unwrap();
        assert!(status.sample_count >= 30);

        let start = Utc::now();
        let short_gap = GapMarker {
            venue: VenueId::Binance,
            instrument: instrument.clone(),
            started_at: start,
            ended_at: start + chrono::Duration::seconds(2),
            reason: GapReason::Timeout,
            seq_before: None,
            seq_after: None,
        };
        assert!(!engine.on_gap(&short_gap));

        let long_gap = GapMarker {
            ended_at: start + chrono::Duration::seconds(10),
            ..short_gap
        };
        assert!(engine.on_gap(&long_gap));

        // Next sample starts a fresh window: count 1, not warmed up.
        clock.advance_secs(1);
        let samples = engine.on_book(&book_at(
            VenueId::Binance,
            "BTC-USDT",
            dec!(9999),
            dec!(10001),
            100,
            Utc::now(),
        ));
        let spread = find(&samples, MetricName::SpreadBps).unwrap();
        assert!(spread.zscore.is_none());
        let status = engine
            .zscore_status(MetricName::SpreadBps, VenueId::Binance, &instrument)
            .unwrap();
        assert_eq!(status.sample_count, 1);
        assert!(!status.warmed_up);
    }
}
