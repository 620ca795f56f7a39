//! Alert domain types: definitions, thresholds, and the alert record.
//!
//! An alert id is stable for one condition-episode; re-triggering after
//! resolution mints a new id. Lifecycle: pending (persisting) -> active ->
//! (escalated)? -> resolved.

use crate::metric::MetricName;
use crate::venue::{InstrumentId, VenueId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Alert priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertPriority {
    P1,
    P2,
    P3,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator for the primary threshold.
///
/// All comparisons are strict; `abs_gt` is uniformly `|value| > threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Lt,
    AbsGt,
    AbsLt,
}

impl Comparison {
    /// Whether `value` breaches `threshold` under this comparison.
    pub fn holds(&self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::AbsGt => value.abs() > threshold,
            Self::AbsLt => value.abs() < threshold,
        }
    }

    /// Whether `candidate` is worse than `current` under this comparison
    /// (used for peak tracking on active alerts).
    pub fn is_worse(&self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            Self::Gt => candidate > current,
            Self::Lt => candidate < current,
            Self::AbsGt => candidate.abs() > current.abs(),
            Self::AbsLt => candidate.abs() < current.abs(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::AbsGt => "abs_gt",
            Self::AbsLt => "abs_lt",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an evaluation that breached the primary threshold did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ZscoreWarmup,
    ZscoreBelow,
    PersistenceStarting,
    PersistenceNotMet,
    Throttled,
    EvaluationError,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZscoreWarmup => "zscore_warmup",
            Self::ZscoreBelow => "zscore_below",
            Self::PersistenceStarting => "persistence_starting",
            Self::PersistenceNotMet => "persistence_not_met",
            Self::Throttled => "throttled",
            Self::EvaluationError => "evaluation_error",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static definition of one alert type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDefinition {
    /// Stable identifier, e.g. "spread_warning".
    pub alert_type: String,
    pub metric: MetricName,
    pub priority: AlertPriority,
    pub severity: AlertSeverity,
    pub comparison: Comparison,
    /// Whether the z-score gate applies.
    pub requires_zscore: bool,
    /// Condition must hold this long before firing. None fires immediately.
    pub persistence_secs: Option<u64>,
    /// Minimum spacing between resolved episodes of the same key.
    pub throttle_secs: u64,
    /// Escalate still-active alerts after this long.
    pub escalate_after_secs: Option<u64>,
    /// Priority to escalate to.
    pub escalate_to: Option<AlertPriority>,
    pub enabled: bool,
}

/// Per-instrument (or wildcard) threshold values for one alert type.
///
/// Thresholds are immutable for the lifetime of a run; reloads are
/// deliberate restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub alert_type: String,
    /// Normalized instrument id, or `*` for the wildcard fallback.
    pub instrument: String,
    pub value: Decimal,
    pub zscore: Option<Decimal>,
    pub priority_override: Option<AlertPriority>,
    pub enabled: bool,
}

/// Resolution lookup: exact instrument first, wildcard `*` fallback.
#[derive(Debug, Clone, Default)]
pub struct ThresholdBook {
    by_key: HashMap<(String, String), Threshold>,
}

impl ThresholdBook {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        let by_key = thresholds
            .into_iter()
            .map(|t| ((t.alert_type.clone(), t.instrument.clone()), t))
            .collect();
        Self { by_key }
    }

    pub fn resolve(&self, alert_type: &str, instrument: &InstrumentId) -> Option<&Threshold> {
        self.by_key
            .get(&(alert_type.to_string(), instrument.as_str().to_string()))
            .or_else(|| self.by_key.get(&(alert_type.to_string(), "*".to_string())))
            .filter(|t| t.enabled)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// How an alert was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionType {
    Auto,
    Timeout,
    Manual,
}

impl ResolutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Timeout => "timeout",
            Self::Manual => "manual",
        }
    }
}

/// A fired alert and its lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: String,
    pub priority: AlertPriority,
    pub severity: AlertSeverity,
    pub venue: VenueId,
    pub instrument: InstrumentId,
    pub metric: MetricName,
    pub trigger_value: Decimal,
    pub trigger_threshold: Decimal,
    pub comparison: Comparison,
    pub zscore_value: Option<Decimal>,
    pub zscore_threshold: Option<Decimal>,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set at resolution: resolved_at - triggered_at.
    pub duration_secs: Option<i64>,
    pub peak_value: Decimal,
    pub peak_at: DateTime<Utc>,
    pub escalated: bool,
    pub escalated_at: Option<DateTime<Utc>>,
    pub original_priority: Option<AlertPriority>,
    pub context: BTreeMap<String, String>,
    pub resolution_type: Option<ResolutionType>,
    pub resolution_value: Option<Decimal>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }

    pub fn market_key(&self) -> crate::venue::MarketKey {
        crate::venue::MarketKey::new(self.venue, self.instrument.clone())
    }
}

/// Lifecycle transition attached to an [`AlertEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertTransition {
    Fired,
    Escalated,
    Resolved,
}

impl AlertTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fired => "fired",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
        }
    }
}

/// An alert lifecycle event, emitted by the detector for storage and
/// notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub transition: AlertTransition,
    pub alert: Alert,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_comparison_strictness() {
        // Strict inequality on all four operators: equality never holds.
        assert!(!Comparison::Gt.holds(dec!(5), dec!(5)));
        assert!(!Comparison::Lt.holds(dec!(5), dec!(5)));
        assert!(!Comparison::AbsGt.holds(dec!(-5), dec!(5)));
        assert!(!Comparison::AbsLt.holds(dec!(-5), dec!(5)));

        assert!(Comparison::Gt.holds(dec!(5.01), dec!(5)));
        assert!(Comparison::Lt.holds(dec!(4.99), dec!(5)));
        assert!(Comparison::AbsGt.holds(dec!(-5.01), dec!(5)));
        assert!(Comparison::AbsLt.holds(dec!(-4.99), dec!(5)));
    }

    #[test]
    fn test_peak_semantics_follow_comparison() {
        assert!(Comparison::Gt.is_worse(dec!(7), dec!(6)));
        assert!(Comparison::Lt.is_worse(dec!(3), dec!(4)));
        assert!(Comparison::AbsGt.is_worse(dec!(-8), dec!(7)));
        assert!(!Comparison::AbsGt.is_worse(dec!(6), dec!(-7)));
    }

    fn threshold(alert_type: &str, instrument: &str, value: Decimal) -> Threshold {
        Threshold {
            alert_type: alert_type.to_string(),
            instrument: instrument.to_string(),
            value,
            zscore: None,
            priority_override: None,
            enabled: true,
        }
    }

    #[test]
    fn test_threshold_exact_beats_wildcard() {
        let book = ThresholdBook::new(vec![
            threshold("spread_warning", "*", dec!(10)),
            threshold("spread_warning", "BTC-USDT", dec!(3)),
        ]);

        let exact = book
            .resolve("spread_warning", &InstrumentId::new("BTC-USDT"))
            .unwrap();
        assert_eq!(exact.value, dec!(3));

        let fallback = book
            .resolve("spread_warning", &InstrumentId::new("ETH-USDT"))
            .unwrap();
        assert_eq!(fallback.value, dec!(10));
    }

    #[test]
    fn test_disabled_threshold_not_resolved() {
        let mut t = threshold("spread_warning", "*", dec!(10));
        t.enabled = false;
        let book = ThresholdBook::new(vec![t]);
        assert!(book
            .resolve("spread_warning", &InstrumentId::new("BTC-USDT"))
            .is_none());
    }

    #[test]
    fn test_unknown_alert_type_not_resolved() {
        let book = ThresholdBook::new(vec![threshold("spread_warning", "*", dec!(10))]);
        assert!(book
            .resolve("basis_warning", &InstrumentId::new("BTC-USDT"))
            .is_none());
    }
}
