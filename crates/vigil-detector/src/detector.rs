//! Anomaly detector.
//!
//! Consumes metric samples and gap markers, drives the pure evaluation
//! through the alert lifecycle, and emits lifecycle events for storage and
//! notification. All timing decisions read the injectable monotonic clock,
//! so replaying a recorded sample stream against a fresh detector with the
//! same configuration yields the same alert timeline.

use crate::dispatch::Dispatcher;
use crate::error::{DetectorError, DetectorResult};
use crate::evaluate::{evaluate, CellEffect, Decision};
use crate::lifecycle::{cond_key, AlertBook};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use vigil_core::{
    Alert, AlertDefinition, AlertEvent, AlertPriority, AlertTransition, GapMarker, MetricName,
    MetricSample, ResolutionType, SharedClock, SkipReason, SnapshotSource, ThresholdBook,
};

/// Detector configuration: the frozen alert-definition and threshold
/// documents plus lifecycle tuning.
pub struct DetectorConfig {
    pub definitions: Vec<AlertDefinition>,
    pub thresholds: ThresholdBook,
    /// Notification channels per priority.
    pub channels: HashMap<AlertPriority, Vec<String>>,
    /// Active alerts whose key stops producing evaluations resolve with
    /// resolution_type=timeout after this long.
    pub resolve_timeout_secs: u64,
    /// Gaps at least this long clear the market's persistence cells.
    pub persistence_clear_gap_ms: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let mut channels = HashMap::new();
        channels.insert(AlertPriority::P1, vec!["console".to_string(), "slack".to_string()]);
        channels.insert(AlertPriority::P2, vec!["console".to_string()]);
        channels.insert(AlertPriority::P3, vec!["console".to_string()]);
        Self {
            definitions: crate::definitions::default_definitions(),
            thresholds: ThresholdBook::default(),
            channels,
            resolve_timeout_secs: 900,
            persistence_clear_gap_ms: 5_000,
        }
    }
}

impl DetectorConfig {
    /// Startup validation: a half-configured document refuses to start.
    pub fn validate(&self) -> DetectorResult<()> {
        for definition in &self.definitions {
            if definition.escalate_after_secs.is_some() != definition.escalate_to.is_some() {
                return Err(DetectorError::InvalidConfig(format!(
                    "{}: escalation needs both a delay and a target priority",
                    definition.alert_type
                )));
            }
            if definition.throttle_secs == 0 {
                return Err(DetectorError::InvalidConfig(format!(
                    "{}: throttle_secs must be positive",
                    definition.alert_type
                )));
            }
        }
        Ok(())
    }
}

/// The detector: single owner of alert and persistence state.
pub struct AnomalyDetector {
    definitions: HashMap<String, AlertDefinition>,
    /// Alert types evaluated per metric, in stable definition order.
    by_metric: HashMap<MetricName, Vec<String>>,
    thresholds: ThresholdBook,
    channels: HashMap<AlertPriority, Vec<String>>,
    resolve_timeout_secs: u64,
    persistence_clear_gap_ms: i64,
    book: AlertBook,
    clock: SharedClock,
    dispatcher: Arc<dyn Dispatcher>,
    skips: HashMap<SkipReason, u64>,
}

impl AnomalyDetector {
    pub fn new(
        config: DetectorConfig,
        clock: SharedClock,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> DetectorResult<Self> {
        config.validate()?;

        let mut by_metric: HashMap<MetricName, Vec<String>> = HashMap::new();
        let mut definitions = HashMap::new();
        for definition in config.definitions {
            if definition.enabled {
                by_metric
                    .entry(definition.metric)
                    .or_default()
                    .push(definition.alert_type.clone());
            }
            definitions.insert(definition.alert_type.clone(), definition);
        }

        Ok(Self {
            definitions,
            by_metric,
            thresholds: config.thresholds,
            channels: config.channels,
            resolve_timeout_secs: config.resolve_timeout_secs,
            persistence_clear_gap_ms: config.persistence_clear_gap_ms,
            book: AlertBook::new(),
            clock,
            dispatcher,
            skips: HashMap::new(),
        })
    }

    /// Evaluate one metric sample against every definition on its metric.
    pub fn on_sample(&mut self, sample: &MetricSample) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let Some(alert_types) = self.by_metric.get(&sample.metric).cloned() else {
            return events;
        };

        let now_mono = self.clock.mono();
        let now_wall = self.clock.wall();

        for alert_type in alert_types {
            let definition = &self.definitions[&alert_type];
            let Some(threshold) = self.thresholds.resolve(&alert_type, &sample.instrument) else {
                continue;
            };

            let key = cond_key(&alert_type, sample.venue, &sample.instrument);
            let outcome = evaluate(
                sample.value,
                sample.zscore,
                definition,
                threshold,
                self.book.cell(&key),
                self.book.has_active(&key),
                self.book
                    .is_throttled(&key, definition.throttle_secs, now_mono),
                now_mono,
            );

            match outcome.cell {
                CellEffect::Clear => self.book.clear_cell(&key),
                CellEffect::Start => self.book.start_cell(key.clone(), now_mono),
                CellEffect::Keep => {}
            }

            match outcome.decision {
                Decision::NotTriggered => {
                    if self.book.has_active(&key) {
                        if let Some(alert) = self.book.resolve(
                            &key,
                            ResolutionType::Auto,
                            Some(sample.value),
                            now_wall,
                        ) {
                            events.push(AlertEvent {
                                transition: AlertTransition::Resolved,
                                alert,
                            });
                        }
                    }
                }
                Decision::Skip(reason) => {
                    *self.skips.entry(reason).or_insert(0) += 1;
                    debug!(
                        alert_type = %alert_type,
                        venue = %sample.venue,
                        instrument = %sample.instrument,
                        value = %sample.value,
                        skip = reason.as_str(),
                        "Evaluation skipped"
                    );
                }
                Decision::UpdateActive => {
                    self.book.update_peak(&key, sample.value, now_wall, now_mono);
                }
                Decision::Fire => {
                    let definition = &self.definitions[&alert_type];
                    let alert = self
                        .book
                        .fire(definition, threshold, sample, now_wall, now_mono);
                    self.dispatch(&alert);
                    events.push(AlertEvent {
                        transition: AlertTransition::Fired,
                        alert,
                    });
                }
            }
        }

        events
    }

    /// Consume a gap marker: clear the market's persistence cells when the
    /// gap qualifies, then run the data_gap condition through the normal
    /// evaluation path.
    pub fn on_gap(&mut self, gap: &GapMarker) -> Vec<AlertEvent> {
        if gap.duration_ms() >= self.persistence_clear_gap_ms {
            self.book.clear_market_cells(gap.venue, &gap.instrument);
        }

        let sample = MetricSample {
            metric: MetricName::GapSeconds,
            venue: gap.venue,
            instrument: gap.instrument.clone(),
            ts: gap.ended_at,
            value: Decimal::from(gap.duration_ms()) / Decimal::from(1000),
            zscore: None,
            source: SnapshotSource::Stream,
        };
        self.on_sample(&sample)
    }

    /// 1 Hz housekeeping: throttle pruning, escalation scan, stale-alert
    /// timeout resolution.
    pub fn on_tick(&mut self) -> Vec<AlertEvent> {
        let now_mono = self.clock.mono();
        let now_wall = self.clock.wall();
        let mut events = Vec::new();

        self.book.prune_throttle(now_mono);

        for alert in self.book.escalation_scan(&self.definitions, now_wall, now_mono) {
            self.dispatch(&alert);
            events.push(AlertEvent {
                transition: AlertTransition::Escalated,
                alert,
            });
        }

        for alert in self
            .book
            .timeout_scan(self.resolve_timeout_secs, now_wall, now_mono)
        {
            events.push(AlertEvent {
                transition: AlertTransition::Resolved,
                alert,
            });
        }

        events
    }

    /// Re-seed active alerts recovered from the hot store.
    pub fn restore_active(&mut self, alerts: Vec<Alert>) {
        self.book
            .restore(alerts, self.clock.wall(), self.clock.mono());
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.book.active_alerts()
    }

    pub fn active_count(&self) -> usize {
        self.book.active_count()
    }

    pub fn persistence_cell_count(&self) -> usize {
        self.book.cell_count()
    }

    /// Skip counters for telemetry.
    pub fn skip_count(&self, reason: SkipReason) -> u64 {
        self.skips.get(&reason).copied().unwrap_or(0)
    }

    fn dispatch(&self, alert: &Alert) {
        let channels = self
            .channels
            .get(&alert.priority)
            .cloned()
            .unwrap_or_default();
        self.dispatcher.dispatch(alert, &channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use vigil_core::{GapReason, InstrumentId, ManualClock, Threshold, VenueId};

    struct RecordingDispatcher {
        sent: Mutex<Vec<(Alert, Vec<String>)>>,
    }

    impl RecordingDispatcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    impl Dispatcher for RecordingDispatcher {
        fn dispatch(&self, alert: &Alert, channels: &[String]) {
            self.sent.lock().push((alert.clone(), channels.to_vec()));
        }
    }

    fn threshold(alert_type: &str, instrument: &str, value: Decimal, zscore: Option<Decimal>) -> Threshold {
        Threshold {
            alert_type: alert_type.to_string(),
            instrument: instrument.to_string(),
            value,
            zscore,
            priority_override: None,
            enabled: true,
        }
    }

    fn detector_with(
        thresholds: Vec<Threshold>,
        clock: Arc<ManualClock>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> AnomalyDetector {
        let config = DetectorConfig {
            thresholds: ThresholdBook::new(thresholds),
            ..Default::default()
        };
        AnomalyDetector::new(config, clock, dispatcher).unwrap()
    }

    fn spread_sample(value: Decimal, zscore: Option<Decimal>) -> MetricSample {
        MetricSample {
            metric: MetricName::SpreadBps,
            venue: VenueId::Binance,
            instrument: InstrumentId::new("BTC-USDT"),
            ts: Utc::now(),
            value,
            zscore,
            source: SnapshotSource::Stream,
        }
    }

    #[test]
    fn test_warmup_suppression() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        let mut detector = detector_with(
            vec![threshold("spread_warning", "*", dec!(3), Some(dec!(2)))],
            clock.clone(),
            dispatcher.clone(),
        );

        // Above threshold but no z-score yet: nothing may fire.
        for _ in 0..10 {
            clock.advance_secs(1);
            let events = detector.on_sample(&spread_sample(dec!(5), None));
            assert!(events.is_empty());
        }
        assert_eq!(detector.skip_count(SkipReason::ZscoreWarmup), 10);
        assert_eq!(detector.active_count(), 0);
        assert_eq!(dispatcher.count(), 0);
    }

    #[test]
    fn test_dual_condition_fire_and_new_id_after_retrigger() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        let mut detector = detector_with(
            vec![threshold("spread_warning", "*", dec!(3), Some(dec!(2)))],
            clock.clone(),
            dispatcher.clone(),
        );

        let events = detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, AlertTransition::Fired);
        let first_id = events[0].alert.id;
        assert_eq!(dispatcher.count(), 1);

        // Condition clears: auto-resolution.
        clock.advance_secs(10);
        let events = detector.on_sample(&spread_sample(dec!(1), Some(dec!(0.1))));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, AlertTransition::Resolved);
        assert_eq!(events[0].alert.id, first_id);

        // Within the throttle window: suppressed.
        clock.advance_secs(10);
        let events = detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        assert!(events.is_empty());
        assert_eq!(detector.skip_count(SkipReason::Throttled), 1);

        // Past the throttle window: a new episode, new id.
        clock.advance_secs(300);
        let events = detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        assert_eq!(events.len(), 1);
        assert_ne!(events[0].alert.id, first_id);
    }

    #[test]
    fn test_peak_survives_to_resolution() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        let mut detector = detector_with(
            vec![threshold("spread_warning", "*", dec!(3), Some(dec!(2)))],
            clock.clone(),
            dispatcher,
        );

        detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        clock.advance_secs(20);
        detector.on_sample(&spread_sample(dec!(9), Some(dec!(7))));
        clock.advance_secs(25);
        let events = detector.on_sample(&spread_sample(dec!(1), Some(dec!(0.1))));

        let resolved = &events[0].alert;
        assert_eq!(resolved.peak_value, dec!(9));
        assert_eq!(resolved.duration_secs, Some(45));
        assert_eq!(resolved.resolution_type, Some(ResolutionType::Auto));
        assert_eq!(resolved.resolution_value, Some(dec!(1)));
    }

    #[test]
    fn test_exact_threshold_beats_wildcard() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        let mut detector = detector_with(
            vec![
                threshold("spread_warning", "*", dec!(3), Some(dec!(2))),
                threshold("spread_warning", "BTC-USDT", dec!(10), Some(dec!(2))),
            ],
            clock,
            dispatcher,
        );

        // 5 bps breaches the wildcard but not the BTC-specific threshold.
        let events = detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        assert!(events.is_empty());
        assert_eq!(detector.active_count(), 0);
    }

    #[test]
    fn test_gap_clears_cells_and_fires_data_gap() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        let mut detector = detector_with(
            vec![
                threshold("basis_warning", "*", dec!(10), Some(dec!(2))),
                threshold("data_gap", "*", dec!(5), None),
            ],
            clock.clone(),
            dispatcher,
        );

        // Start a basis persistence cell.
        let basis = MetricSample {
            metric: MetricName::BasisBps,
            venue: VenueId::Okx,
            instrument: InstrumentId::new("BTC-USDT-PERP"),
            ts: Utc::now(),
            value: dec!(20),
            zscore: Some(dec!(5)),
            source: SnapshotSource::Stream,
        };
        detector.on_sample(&basis);
        assert_eq!(detector.persistence_cell_count(), 1);

        // A 10 s gap on that market clears the cell and fires data_gap.
        let start = Utc::now();
        let gap = GapMarker {
            venue: VenueId::Okx,
            instrument: InstrumentId::new("BTC-USDT-PERP"),
            started_at: start,
            ended_at: start + chrono::Duration::seconds(10),
            reason: GapReason::Disconnect,
            seq_before: Some(7),
            seq_after: None,
        };
        let events = detector.on_gap(&gap);

        assert_eq!(detector.persistence_cell_count(), 0);
        assert_eq!(events.len(), 1);
        let alert = &events[0].alert;
        assert_eq!(alert.alert_type, "data_gap");
        assert_eq!(alert.trigger_value, dec!(10));

        // A later 2 s gap is below the data_gap threshold: the active
        // data_gap alert auto-resolves, and no cells are touched.
        let short = GapMarker {
            ended_at: start + chrono::Duration::seconds(2),
            ..gap
        };
        let events = detector.on_gap(&short);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, AlertTransition::Resolved);
        assert_eq!(detector.active_count(), 0);
    }

    #[test]
    fn test_escalation_via_tick() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        let mut detector = detector_with(
            vec![threshold("spread_warning", "*", dec!(3), Some(dec!(2)))],
            clock.clone(),
            dispatcher.clone(),
        );

        detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        assert_eq!(dispatcher.count(), 1);

        // Keep the alert from timing out, then cross the escalation delay
        // (900 s for spread_warning).
        clock.advance_secs(500);
        detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        clock.advance_secs(401);
        let events = detector.on_tick();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, AlertTransition::Escalated);
        assert_eq!(events[0].alert.priority, AlertPriority::P1);
        assert_eq!(events[0].alert.original_priority, Some(AlertPriority::P2));
        // Escalation dispatched a second notification.
        assert_eq!(dispatcher.count(), 2);
    }

    #[test]
    fn test_evaluation_error_on_missing_zscore_threshold() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        // spread_warning requires a z-score but the document omits it.
        let mut detector = detector_with(
            vec![threshold("spread_warning", "*", dec!(3), None)],
            clock,
            dispatcher.clone(),
        );

        let events = detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        assert!(events.is_empty());
        assert_eq!(detector.skip_count(SkipReason::EvaluationError), 1);
        assert_eq!(dispatcher.count(), 0);
    }

    #[test]
    fn test_restore_then_resolve() {
        let clock = ManualClock::shared(Utc::now());
        let dispatcher = RecordingDispatcher::new();
        let mut detector = detector_with(
            vec![threshold("spread_warning", "*", dec!(3), Some(dec!(2)))],
            clock.clone(),
            dispatcher.clone(),
        );

        let events = detector.on_sample(&spread_sample(dec!(5), Some(dec!(6))));
        let alerts = detector.active_alerts();
        assert_eq!(alerts.len(), 1);
        let id = events[0].alert.id;

        // A fresh detector (restart) restores the same active set.
        let mut restored = detector_with(
            vec![threshold("spread_warning", "*", dec!(3), Some(dec!(2)))],
            clock.clone(),
            dispatcher,
        );
        restored.restore_active(alerts);
        assert_eq!(restored.active_count(), 1);

        clock.advance_secs(30);
        let events = restored.on_sample(&spread_sample(dec!(1), Some(dec!(0.1))));
        assert_eq!(events[0].transition, AlertTransition::Resolved);
        assert_eq!(events[0].alert.id, id);
    }
}
