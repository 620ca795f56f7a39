//! Hot-store projection builders.
//!
//! Convert domain records into the key layout the UI reads. Field names
//! here are part of the external contract along with the keys.

use crate::hot::HotCommand;
use crate::keys;
use vigil_core::{
    Alert, AlertEvent, AlertTransition, GapMarker, HealthSnapshot, MetricSample,
    OrderBookSnapshot, SnapshotSource,
};

fn levels_json(levels: &[vigil_core::BookLevel]) -> String {
    let pairs: Vec<[String; 2]> = levels
        .iter()
        .map(|l| [l.price.to_string(), l.qty.to_string()])
        .collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

/// Latest book state: `orderbook:{venue}:{instrument}`.
pub fn book(snapshot: &OrderBookSnapshot) -> HotCommand {
    let mut fields = vec![
        ("venue".to_string(), snapshot.venue.to_string()),
        ("instrument".to_string(), snapshot.instrument.to_string()),
        ("venue_time".to_string(), snapshot.venue_time.to_rfc3339()),
        ("received_at".to_string(), snapshot.received_at.to_rfc3339()),
        ("sequence_id".to_string(), snapshot.sequence_id.to_string()),
        ("bids".to_string(), levels_json(&snapshot.bids)),
        ("asks".to_string(), levels_json(&snapshot.asks)),
        ("depth_levels".to_string(), snapshot.depth_levels.to_string()),
        (
            "source".to_string(),
            match snapshot.source {
                SnapshotSource::Stream => "stream".to_string(),
                SnapshotSource::RestPoll => "rest_poll".to_string(),
            },
        ),
    ];
    if let Some(bid) = snapshot.best_bid() {
        fields.push(("best_bid".to_string(), bid.price.to_string()));
    }
    if let Some(ask) = snapshot.best_ask() {
        fields.push(("best_ask".to_string(), ask.price.to_string()));
    }
    if let Some(mid) = snapshot.mid() {
        fields.push(("mid".to_string(), mid.to_string()));
    }

    HotCommand::PutHash {
        key: keys::orderbook(snapshot.venue, &snapshot.instrument),
        fields,
    }
}

/// Z-score projections for one sample: the rolling buffer plus the
/// current-value hash. An absent z-score removes the field so the UI can
/// distinguish warmup from zero.
pub fn zscore(sample: &MetricSample, buffer_cap: usize) -> Vec<HotCommand> {
    let metric = sample.metric.wire_name();
    let current_key = keys::zscore_current(sample.venue, &sample.instrument);
    match sample.zscore {
        Some(z) => vec![
            HotCommand::PushList {
                key: keys::zscore_buffer(sample.venue, &sample.instrument, &metric),
                value: z.to_string(),
                cap: buffer_cap,
            },
            HotCommand::MergeHash {
                key: current_key,
                fields: vec![(metric, z.to_string())],
            },
        ],
        None => vec![HotCommand::RemoveHashField {
            key: current_key,
            field: metric,
        }],
    }
}

fn alert_fields(alert: &Alert) -> Vec<(String, String)> {
    let mut fields = vec![
        ("id".to_string(), alert.id.to_string()),
        ("alert_type".to_string(), alert.alert_type.clone()),
        ("priority".to_string(), alert.priority.to_string()),
        ("severity".to_string(), alert.severity.to_string()),
        ("venue".to_string(), alert.venue.to_string()),
        ("instrument".to_string(), alert.instrument.to_string()),
        ("metric".to_string(), alert.metric.wire_name()),
        ("trigger_value".to_string(), alert.trigger_value.to_string()),
        (
            "trigger_threshold".to_string(),
            alert.trigger_threshold.to_string(),
        ),
        ("comparison".to_string(), alert.comparison.to_string()),
        ("triggered_at".to_string(), alert.triggered_at.to_rfc3339()),
        ("peak_value".to_string(), alert.peak_value.to_string()),
        ("peak_at".to_string(), alert.peak_at.to_rfc3339()),
        ("escalated".to_string(), alert.escalated.to_string()),
    ];
    if let Some(z) = alert.zscore_value {
        fields.push(("zscore_value".to_string(), z.to_string()));
    }
    if let Some(z) = alert.zscore_threshold {
        fields.push(("zscore_threshold".to_string(), z.to_string()));
    }
    if let Some(at) = alert.escalated_at {
        fields.push(("escalated_at".to_string(), at.to_rfc3339()));
    }
    if let Some(p) = alert.original_priority {
        fields.push(("original_priority".to_string(), p.to_string()));
    }
    fields
}

/// Alert lifecycle projection. `dedup_ttl_secs` is the definition's
/// throttle window, written as the dedup marker TTL at fire time.
pub fn alert_event(event: &AlertEvent, dedup_ttl_secs: Option<u64>) -> Vec<HotCommand> {
    let alert = &event.alert;
    let record_key = keys::alert_active(alert.id);
    let id = alert.id.to_string();

    match event.transition {
        AlertTransition::Fired => {
            let mut commands = vec![
                HotCommand::PutHash {
                    key: record_key,
                    fields: alert_fields(alert),
                },
                HotCommand::AddToSet {
                    key: keys::alerts_by_instrument(&alert.instrument),
                    member: id.clone(),
                },
                HotCommand::AddToSet {
                    key: keys::alerts_by_priority(alert.priority),
                    member: id,
                },
            ];
            if let Some(ttl) = dedup_ttl_secs {
                commands.push(HotCommand::PutString {
                    key: keys::alert_dedup(&alert.alert_type, alert.venue, &alert.instrument),
                    value: alert.id.to_string(),
                    ttl_secs: Some(ttl),
                });
            }
            commands
        }
        AlertTransition::Escalated => {
            let mut commands = vec![HotCommand::PutHash {
                key: record_key,
                fields: alert_fields(alert),
            }];
            if let Some(original) = alert.original_priority {
                commands.push(HotCommand::RemoveFromSet {
                    key: keys::alerts_by_priority(original),
                    member: id.clone(),
                });
            }
            commands.push(HotCommand::AddToSet {
                key: keys::alerts_by_priority(alert.priority),
                member: id,
            });
            commands
        }
        AlertTransition::Resolved => vec![
            HotCommand::Delete { key: record_key },
            HotCommand::RemoveFromSet {
                key: keys::alerts_by_instrument(&alert.instrument),
                member: id.clone(),
            },
            HotCommand::RemoveFromSet {
                key: keys::alerts_by_priority(alert.priority),
                member: id,
            },
        ],
    }
}

/// Health projection: `health:{venue}`.
pub fn health(snapshot: &HealthSnapshot) -> HotCommand {
    let mut fields = vec![
        ("venue".to_string(), snapshot.venue.to_string()),
        ("status".to_string(), snapshot.status.to_string()),
        (
            "message_count".to_string(),
            snapshot.message_count.to_string(),
        ),
        ("lag_ms".to_string(), snapshot.lag_ms.to_string()),
        (
            "reconnect_count".to_string(),
            snapshot.reconnect_count.to_string(),
        ),
        (
            "gaps_last_hour".to_string(),
            snapshot.gaps_last_hour.to_string(),
        ),
    ];
    if let Some(at) = snapshot.last_message_at {
        fields.push(("last_message_at".to_string(), at.to_rfc3339()));
    }
    HotCommand::PutHash {
        key: keys::health(snapshot.venue),
        fields,
    }
}

/// Recent gap markers: a capped list per market.
pub fn gap(marker: &GapMarker, cap: usize) -> HotCommand {
    let value = serde_json::to_string(marker).unwrap_or_default();
    HotCommand::PushList {
        key: format!("gaps:{}:{}", marker.venue, marker.instrument),
        value,
        cap,
    }
}
