//! Prometheus metrics for the vigil pipeline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means duplicate metric names, which is a fatal configuration
//! error that should crash at startup, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge,
    register_int_gauge_vec, CounterVec, GaugeVec, HistogramVec, IntGauge, IntGaugeVec,
};

/// Venue connection status (1 = active state).
/// Labels: venue, status (connected/degraded/reconnecting/disconnected)
pub static VENUE_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "vigil_venue_status",
        "Venue connection status (1=active state)",
        &["venue", "status"]
    )
    .unwrap()
});

/// Total messages received per venue.
pub static MESSAGES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vigil_messages_total",
        "Total normalized messages received",
        &["venue", "kind"]
    )
    .unwrap()
});

/// Receive-path lag in milliseconds.
pub static FEED_LAG_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "vigil_feed_lag_ms",
        "Receive-path lag of the latest streamed message",
        &["venue"]
    )
    .unwrap()
});

/// Gap markers emitted.
/// Labels: venue, reason
pub static GAPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vigil_gaps_total",
        "Total gap markers emitted",
        &["venue", "reason"]
    )
    .unwrap()
});

/// Metric samples produced.
pub static SAMPLES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vigil_samples_total",
        "Total metric samples produced",
        &["venue", "metric"]
    )
    .unwrap()
});

/// Alert lifecycle transitions.
/// Labels: alert_type, transition (fired/escalated/resolved)
pub static ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vigil_alerts_total",
        "Total alert lifecycle transitions",
        &["alert_type", "transition"]
    )
    .unwrap()
});

/// Evaluation skips.
/// Labels: reason (zscore_warmup/zscore_below/persistence_starting/...)
pub static EVAL_SKIPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vigil_eval_skips_total",
        "Total gated evaluations by skip reason",
        &["reason"]
    )
    .unwrap()
});

/// Currently active alerts.
pub static ACTIVE_ALERTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("vigil_active_alerts", "Currently active alerts").unwrap()
});

/// Per-snapshot metrics-engine latency in microseconds.
pub static ENGINE_LATENCY_US: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vigil_engine_latency_us",
        "Metrics engine per-snapshot latency in microseconds",
        &["venue"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Hot store degraded flag (1 = degraded).
pub static HOT_STORE_DEGRADED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "vigil_hot_store_degraded",
        "Hot store degraded flag (1=degraded)"
    )
    .unwrap()
});

/// Cold-store fallback queue depth.
pub static COLD_QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "vigil_cold_queue_depth",
        "Cold store fallback queue depth in rows"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set the venue status gauge. Only the active state is 1.
    pub fn venue_status(venue: &str, status: &str) {
        for s in &["connected", "degraded", "reconnecting", "disconnected"] {
            VENUE_STATUS.with_label_values(&[venue, s]).set(0);
        }
        VENUE_STATUS.with_label_values(&[venue, status]).set(1);
    }

    pub fn message(venue: &str, kind: &str) {
        MESSAGES_TOTAL.with_label_values(&[venue, kind]).inc();
    }

    pub fn feed_lag(venue: &str, lag_ms: f64) {
        FEED_LAG_MS.with_label_values(&[venue]).set(lag_ms);
    }

    pub fn gap(venue: &str, reason: &str) {
        GAPS_TOTAL.with_label_values(&[venue, reason]).inc();
    }

    pub fn sample(venue: &str, metric: &str) {
        SAMPLES_TOTAL.with_label_values(&[venue, metric]).inc();
    }

    pub fn alert(alert_type: &str, transition: &str) {
        ALERTS_TOTAL
            .with_label_values(&[alert_type, transition])
            .inc();
    }

    pub fn eval_skip(reason: &str) {
        EVAL_SKIPS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn active_alerts(count: i64) {
        ACTIVE_ALERTS.set(count);
    }

    pub fn engine_latency(venue: &str, micros: f64) {
        ENGINE_LATENCY_US.with_label_values(&[venue]).observe(micros);
    }

    pub fn hot_store_degraded(degraded: bool) {
        HOT_STORE_DEGRADED.set(if degraded { 1 } else { 0 });
    }

    pub fn cold_queue_depth(depth: i64) {
        COLD_QUEUE_DEPTH.set(depth);
    }
}
