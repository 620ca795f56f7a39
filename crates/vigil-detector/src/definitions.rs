//! Built-in alert definitions.
//!
//! The deployment's alert-definition document usually starts from this
//! registry and overrides pieces per environment. Thresholds always come
//! from configuration; definitions only carry semantics.

use vigil_core::{AlertDefinition, AlertPriority, AlertSeverity, Comparison, MetricName};

fn def(
    alert_type: &str,
    metric: MetricName,
    priority: AlertPriority,
    severity: AlertSeverity,
    comparison: Comparison,
    requires_zscore: bool,
) -> AlertDefinition {
    AlertDefinition {
        alert_type: alert_type.to_string(),
        metric,
        priority,
        severity,
        comparison,
        requires_zscore,
        persistence_secs: None,
        throttle_secs: 300,
        escalate_after_secs: None,
        escalate_to: None,
        enabled: true,
    }
}

/// The default alert catalogue.
pub fn default_definitions() -> Vec<AlertDefinition> {
    vec![
        AlertDefinition {
            escalate_after_secs: Some(900),
            escalate_to: Some(AlertPriority::P1),
            ..def(
                "spread_warning",
                MetricName::SpreadBps,
                AlertPriority::P2,
                AlertSeverity::Warning,
                Comparison::Gt,
                true,
            )
        },
        def(
            "spread_critical",
            MetricName::SpreadBps,
            AlertPriority::P1,
            AlertSeverity::Critical,
            Comparison::Gt,
            true,
        ),
        AlertDefinition {
            persistence_secs: Some(60),
            throttle_secs: 600,
            ..def(
                "depth_low",
                MetricName::DepthTotal(10),
                AlertPriority::P2,
                AlertSeverity::Warning,
                Comparison::Lt,
                false,
            )
        },
        def(
            "imbalance_extreme",
            MetricName::Imbalance,
            AlertPriority::P3,
            AlertSeverity::Info,
            Comparison::AbsGt,
            true,
        ),
        AlertDefinition {
            persistence_secs: Some(120),
            escalate_after_secs: Some(900),
            escalate_to: Some(AlertPriority::P1),
            ..def(
                "basis_warning",
                MetricName::BasisBps,
                AlertPriority::P2,
                AlertSeverity::Warning,
                Comparison::AbsGt,
                true,
            )
        },
        def(
            "basis_critical",
            MetricName::BasisBps,
            AlertPriority::P1,
            AlertSeverity::Critical,
            Comparison::AbsGt,
            true,
        ),
        def(
            "mark_deviation",
            MetricName::MarkIndexDevBps,
            AlertPriority::P2,
            AlertSeverity::Warning,
            Comparison::AbsGt,
            true,
        ),
        def(
            "divergence_warning",
            MetricName::DivergenceBps,
            AlertPriority::P2,
            AlertSeverity::Warning,
            Comparison::AbsGt,
            true,
        ),
        AlertDefinition {
            throttle_secs: 60,
            ..def(
                "data_gap",
                MetricName::GapSeconds,
                AlertPriority::P1,
                AlertSeverity::Critical,
                Comparison::Gt,
                false,
            )
        },
    ]
}
