//! Alert lifecycle state.
//!
//! The `AlertBook` owns the active-alert map, persistence cells, and the
//! throttle map for every (alert_type, venue, instrument) key. It is
//! mutated only by the detector task; no locks, and the whole state
//! machine is testable with a manual clock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use vigil_core::{
    Alert, AlertDefinition, AlertPriority, InstrumentId, MetricSample, ResolutionType, Threshold,
    VenueId,
};

/// Condition key: one alert type on one market.
pub type CondKey = (String, VenueId, InstrumentId);

pub fn cond_key(alert_type: &str, venue: VenueId, instrument: &InstrumentId) -> CondKey {
    (alert_type.to_string(), venue, instrument.clone())
}

struct ActiveEntry {
    alert: Alert,
    triggered_mono: Duration,
    last_eval_mono: Duration,
}

struct ThrottleEntry {
    fired_mono: Duration,
    resolved: bool,
    /// Entry lifetime: max(throttle, escalation) of the definition.
    ttl: Duration,
}

/// Owns active alerts, persistence cells, and throttle markers.
#[derive(Default)]
pub struct AlertBook {
    active: HashMap<CondKey, ActiveEntry>,
    persistence: HashMap<CondKey, Duration>,
    throttle: HashMap<CondKey, ThrottleEntry>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    // --- persistence cells ---

    pub fn cell(&self, key: &CondKey) -> Option<Duration> {
        self.persistence.get(key).copied()
    }

    pub fn start_cell(&mut self, key: CondKey, now_mono: Duration) {
        self.persistence.entry(key).or_insert(now_mono);
    }

    pub fn clear_cell(&mut self, key: &CondKey) {
        self.persistence.remove(key);
    }

    /// Clear every pending cell for one market (qualifying gap arrived).
    pub fn clear_market_cells(&mut self, venue: VenueId, instrument: &InstrumentId) {
        self.persistence
            .retain(|(_, v, inst), _| !(*v == venue && inst == instrument));
    }

    pub fn cell_count(&self) -> usize {
        self.persistence.len()
    }

    // --- throttle ---

    pub fn has_active(&self, key: &CondKey) -> bool {
        self.active.contains_key(key)
    }

    /// Whether a resolved episode for this key fired within the throttle
    /// window.
    pub fn is_throttled(&self, key: &CondKey, throttle_secs: u64, now_mono: Duration) -> bool {
        self.throttle.get(key).is_some_and(|entry| {
            entry.resolved
                && now_mono.saturating_sub(entry.fired_mono) < Duration::from_secs(throttle_secs)
        })
    }

    /// Drop throttle entries past their TTL.
    pub fn prune_throttle(&mut self, now_mono: Duration) {
        self.throttle
            .retain(|_, entry| now_mono.saturating_sub(entry.fired_mono) < entry.ttl);
    }

    // --- lifecycle transitions ---

    /// Mint a new alert for a fired condition.
    #[allow(clippy::too_many_arguments)]
    pub fn fire(
        &mut self,
        definition: &AlertDefinition,
        threshold: &Threshold,
        sample: &MetricSample,
        now_wall: DateTime<Utc>,
        now_mono: Duration,
    ) -> Alert {
        let priority = threshold.priority_override.unwrap_or(definition.priority);
        let mut context = std::collections::BTreeMap::new();
        context.insert("metric".to_string(), sample.metric.wire_name());
        context.insert(
            "source".to_string(),
            match sample.source {
                vigil_core::SnapshotSource::Stream => "stream".to_string(),
                vigil_core::SnapshotSource::RestPoll => "rest_poll".to_string(),
            },
        );

        let alert = Alert {
            id: Uuid::new_v4(),
            alert_type: definition.alert_type.clone(),
            priority,
            severity: definition.severity,
            venue: sample.venue,
            instrument: sample.instrument.clone(),
            metric: sample.metric,
            trigger_value: sample.value,
            trigger_threshold: threshold.value,
            comparison: definition.comparison,
            zscore_value: sample.zscore,
            zscore_threshold: threshold.zscore.filter(|_| definition.requires_zscore),
            triggered_at: now_wall,
            acknowledged_at: None,
            resolved_at: None,
            duration_secs: None,
            peak_value: sample.value,
            peak_at: now_wall,
            escalated: false,
            escalated_at: None,
            original_priority: None,
            context,
            resolution_type: None,
            resolution_value: None,
        };

        let key = cond_key(&definition.alert_type, sample.venue, &sample.instrument);
        let ttl_secs = definition
            .throttle_secs
            .max(definition.escalate_after_secs.unwrap_or(0));
        self.throttle.insert(
            key.clone(),
            ThrottleEntry {
                fired_mono: now_mono,
                resolved: false,
                ttl: Duration::from_secs(ttl_secs.max(1)),
            },
        );
        self.active.insert(
            key,
            ActiveEntry {
                alert: alert.clone(),
                triggered_mono: now_mono,
                last_eval_mono: now_mono,
            },
        );

        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            venue = %alert.venue,
            instrument = %alert.instrument,
            priority = %alert.priority,
            value = %alert.trigger_value,
            threshold = %alert.trigger_threshold,
            "Alert fired"
        );
        alert
    }

    /// Update the peak on an active alert if the new value is worse under
    /// the alert's comparison.
    pub fn update_peak(
        &mut self,
        key: &CondKey,
        value: Decimal,
        now_wall: DateTime<Utc>,
        now_mono: Duration,
    ) {
        if let Some(entry) = self.active.get_mut(key) {
            entry.last_eval_mono = now_mono;
            if entry
                .alert
                .comparison
                .is_worse(value, entry.alert.peak_value)
            {
                entry.alert.peak_value = value;
                entry.alert.peak_at = now_wall;
            }
        }
    }

    /// Resolve an active alert. Returns the final record.
    pub fn resolve(
        &mut self,
        key: &CondKey,
        resolution: ResolutionType,
        resolution_value: Option<Decimal>,
        now_wall: DateTime<Utc>,
    ) -> Option<Alert> {
        let entry = self.active.remove(key)?;
        let mut alert = entry.alert;
        alert.resolved_at = Some(now_wall);
        alert.duration_secs = Some((now_wall - alert.triggered_at).num_seconds());
        alert.resolution_type = Some(resolution);
        alert.resolution_value = resolution_value;

        if let Some(throttle) = self.throttle.get_mut(key) {
            throttle.resolved = true;
        }

        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            duration_secs = alert.duration_secs.unwrap_or(0),
            resolution = resolution.as_str(),
            "Alert resolved"
        );
        Some(alert)
    }

    /// 1 Hz escalation scan over active alerts. Returns the escalated
    /// records; the alert id never changes.
    pub fn escalation_scan(
        &mut self,
        definitions: &HashMap<String, AlertDefinition>,
        now_wall: DateTime<Utc>,
        now_mono: Duration,
    ) -> Vec<Alert> {
        let mut escalated = Vec::new();
        for entry in self.active.values_mut() {
            if entry.alert.escalated {
                continue;
            }
            let Some(definition) = definitions.get(&entry.alert.alert_type) else {
                continue;
            };
            let (Some(after_secs), Some(to_priority)) =
                (definition.escalate_after_secs, definition.escalate_to)
            else {
                continue;
            };
            if now_mono.saturating_sub(entry.triggered_mono) < Duration::from_secs(after_secs) {
                continue;
            }

            entry.alert.original_priority = Some(entry.alert.priority);
            entry.alert.priority = to_priority;
            entry.alert.escalated = true;
            entry.alert.escalated_at = Some(now_wall);
            info!(
                alert_id = %entry.alert.id,
                alert_type = %entry.alert.alert_type,
                from = %entry.alert.original_priority.unwrap_or(AlertPriority::P3),
                to = %to_priority,
                "Alert escalated"
            );
            escalated.push(entry.alert.clone());
        }
        escalated
    }

    /// Resolve alerts whose condition has not been evaluated for
    /// `timeout_secs` (stale data: the key stopped producing samples).
    pub fn timeout_scan(
        &mut self,
        timeout_secs: u64,
        now_wall: DateTime<Utc>,
        now_mono: Duration,
    ) -> Vec<Alert> {
        let stale: Vec<CondKey> = self
            .active
            .iter()
            .filter(|(_, entry)| {
                now_mono.saturating_sub(entry.last_eval_mono) >= Duration::from_secs(timeout_secs)
            })
            .map(|(key, _)| key.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|key| self.resolve(&key, ResolutionType::Timeout, None, now_wall))
            .collect()
    }

    // --- projections ---

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active.values().map(|e| e.alert.clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn get_active(&self, key: &CondKey) -> Option<&Alert> {
        self.active.get(key).map(|e| &e.alert)
    }

    /// Re-seed active alerts recovered from the hot store at startup.
    /// Monotonic anchors are reconstructed from the committed wall-clock
    /// timestamps.
    pub fn restore(&mut self, alerts: Vec<Alert>, now_wall: DateTime<Utc>, now_mono: Duration) {
        for alert in alerts {
            if alert.resolved_at.is_some() {
                continue;
            }
            let age = (now_wall - alert.triggered_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let key = cond_key(&alert.alert_type, alert.venue, &alert.instrument);
            self.active.insert(
                key,
                ActiveEntry {
                    alert,
                    triggered_mono: now_mono.saturating_sub(age),
                    last_eval_mono: now_mono,
                },
            );
        }
    }
}
