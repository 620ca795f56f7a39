//! Pure alert evaluation.
//!
//! Given a sample, definition, threshold, persistence cell, and clock
//! reading, decide whether the condition fires. No state lives here; the
//! detector applies the returned effects. This keeps the contract
//! replayable: identical inputs always produce identical decisions.

use rust_decimal::Decimal;
use std::time::Duration;
use vigil_core::{AlertDefinition, SkipReason, Threshold};

/// What the detector should do with the condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Condition is false: auto-resolve any active alert for the key.
    NotTriggered,
    /// Condition breached but gated.
    Skip(SkipReason),
    /// An alert is already active for the key: update its peak.
    UpdateActive,
    /// Mint a new alert.
    Fire,
}

/// Persistence-cell side effect of the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellEffect {
    /// Condition is false (or z-gated): forget the cell.
    Clear,
    /// Condition first became true: start the timer now.
    Start,
    /// Leave the cell as it is.
    Keep,
}

/// Evaluation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOutcome {
    pub decision: Decision,
    pub cell: CellEffect,
}

fn outcome(decision: Decision, cell: CellEffect) -> EvalOutcome {
    EvalOutcome { decision, cell }
}

/// Evaluate one (sample, definition, threshold) against the current key
/// state.
///
/// `persistence_cell` is the monotonic first-seen time, if the condition
/// was already holding. `has_active` and `throttled` describe the key's
/// alert state at `now_mono`.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    value: Decimal,
    zscore: Option<Decimal>,
    definition: &AlertDefinition,
    threshold: &Threshold,
    persistence_cell: Option<Duration>,
    has_active: bool,
    throttled: bool,
    now_mono: Duration,
) -> EvalOutcome {
    // 1. Primary comparison. Strict inequalities throughout.
    if !definition.comparison.holds(value, threshold.value) {
        return outcome(Decision::NotTriggered, CellEffect::Clear);
    }

    // 2. Z-score gate. The dual condition is threshold AND z-score, so a
    //    z-gated breach also clears the persistence timer.
    if definition.requires_zscore {
        let Some(zscore_threshold) = threshold.zscore else {
            // Definition demands a z-gate the threshold document never
            // provided. Suppress rather than fire half-checked.
            return outcome(Decision::Skip(SkipReason::EvaluationError), CellEffect::Keep);
        };
        let Some(z) = zscore else {
            return outcome(Decision::Skip(SkipReason::ZscoreWarmup), CellEffect::Clear);
        };
        if z.abs() < zscore_threshold {
            return outcome(Decision::Skip(SkipReason::ZscoreBelow), CellEffect::Clear);
        }
    }

    // 3. Persistence gate.
    if let Some(required_secs) = definition.persistence_secs.filter(|s| *s > 0) {
        match persistence_cell {
            None => {
                return outcome(
                    Decision::Skip(SkipReason::PersistenceStarting),
                    CellEffect::Start,
                );
            }
            Some(first_seen) => {
                let held = now_mono.saturating_sub(first_seen);
                if held < Duration::from_secs(required_secs) {
                    return outcome(
                        Decision::Skip(SkipReason::PersistenceNotMet),
                        CellEffect::Keep,
                    );
                }
            }
        }
    }

    // 4. Throttle gate.
    if has_active {
        return outcome(Decision::UpdateActive, CellEffect::Keep);
    }
    if throttled {
        return outcome(Decision::Skip(SkipReason::Throttled), CellEffect::Keep);
    }

    // 5. Fire.
    outcome(Decision::Fire, CellEffect::Keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vigil_core::{AlertPriority, AlertSeverity, Comparison, MetricName};

    fn definition(requires_zscore: bool, persistence_secs: Option<u64>) -> AlertDefinition {
        AlertDefinition {
            alert_type: "spread_warning".to_string(),
            metric: MetricName::SpreadBps,
            priority: AlertPriority::P2,
            severity: AlertSeverity::Warning,
            comparison: Comparison::Gt,
            requires_zscore,
            persistence_secs,
            throttle_secs: 300,
            escalate_after_secs: None,
            escalate_to: None,
            enabled: true,
        }
    }

    fn threshold(value: Decimal, zscore: Option<Decimal>) -> Threshold {
        Threshold {
            alert_type: "spread_warning".to_string(),
            instrument: "*".to_string(),
            value,
            zscore,
            priority_override: None,
            enabled: true,
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_condition_false_clears_cell() {
        let out = evaluate(
            dec!(2),
            None,
            &definition(false, None),
            &threshold(dec!(3), None),
            Some(secs(10)),
            false,
            false,
            secs(100),
        );
        assert_eq!(out.decision, Decision::NotTriggered);
        assert_eq!(out.cell, CellEffect::Clear);
    }

    #[test]
    fn test_simple_fire_without_gates() {
        let out = evaluate(
            dec!(5),
            None,
            &definition(false, None),
            &threshold(dec!(3), None),
            None,
            false,
            false,
            secs(100),
        );
        assert_eq!(out.decision, Decision::Fire);
        assert_eq!(out.cell, CellEffect::Keep);
    }

    #[test]
    fn test_zscore_warmup_skip() {
        let out = evaluate(
            dec!(5),
            None, // absent during warmup
            &definition(true, None),
            &threshold(dec!(3), Some(dec!(2))),
            None,
            false,
            false,
            secs(100),
        );
        assert_eq!(out.decision, Decision::Skip(SkipReason::ZscoreWarmup));
        assert_eq!(out.cell, CellEffect::Clear);
    }

    #[test]
    fn test_zscore_below_skip() {
        let out = evaluate(
            dec!(5),
            Some(dec!(1.5)),
            &definition(true, None),
            &threshold(dec!(3), Some(dec!(2))),
            None,
            false,
            false,
            secs(100),
        );
        assert_eq!(out.decision, Decision::Skip(SkipReason::ZscoreBelow));
    }

    #[test]
    fn test_zscore_gate_fires_at_threshold() {
        // The gate is |z| >= threshold; exactly at threshold fires.
        let out = evaluate(
            dec!(5),
            Some(dec!(-2)),
            &definition(true, None),
            &threshold(dec!(3), Some(dec!(2))),
            None,
            false,
            false,
            secs(100),
        );
        assert_eq!(out.decision, Decision::Fire);
    }

    #[test]
    fn test_missing_zscore_threshold_is_evaluation_error() {
        let out = evaluate(
            dec!(5),
            Some(dec!(6)),
            &definition(true, None),
            &threshold(dec!(3), None),
            None,
            false,
            false,
            secs(100),
        );
        assert_eq!(out.decision, Decision::Skip(SkipReason::EvaluationError));
    }

    #[test]
    fn test_persistence_starting_then_not_met_then_fire() {
        let def = definition(false, Some(120));
        let thr = threshold(dec!(3), None);

        // First true evaluation starts the cell.
        let out = evaluate(dec!(5), None, &def, &thr, None, false, false, secs(0));
        assert_eq!(out.decision, Decision::Skip(SkipReason::PersistenceStarting));
        assert_eq!(out.cell, CellEffect::Start);

        // Held 119 s: not met.
        let out = evaluate(dec!(5), None, &def, &thr, Some(secs(0)), false, false, secs(119));
        assert_eq!(out.decision, Decision::Skip(SkipReason::PersistenceNotMet));
        assert_eq!(out.cell, CellEffect::Keep);

        // Held 120 s: fires.
        let out = evaluate(dec!(5), None, &def, &thr, Some(secs(0)), false, false, secs(120));
        assert_eq!(out.decision, Decision::Fire);
    }

    #[test]
    fn test_active_alert_updates_peak() {
        let out = evaluate(
            dec!(7),
            None,
            &definition(false, None),
            &threshold(dec!(3), None),
            None,
            true,
            false,
            secs(100),
        );
        assert_eq!(out.decision, Decision::UpdateActive);
    }

    #[test]
    fn test_throttled_skip() {
        let out = evaluate(
            dec!(7),
            None,
            &definition(false, None),
            &threshold(dec!(3), None),
            None,
            false,
            true,
            secs(100),
        );
        assert_eq!(out.decision, Decision::Skip(SkipReason::Throttled));
    }

    #[test]
    fn test_abs_comparisons() {
        let mut def = definition(false, None);
        def.comparison = Comparison::AbsGt;
        let thr = threshold(dec!(3), None);

        let out = evaluate(dec!(-5), None, &def, &thr, None, false, false, secs(0));
        assert_eq!(out.decision, Decision::Fire);

        // Strict: |-3| is not > 3.
        let out = evaluate(dec!(-3), None, &def, &thr, None, false, false, secs(0));
        assert_eq!(out.decision, Decision::NotTriggered);
    }
}
