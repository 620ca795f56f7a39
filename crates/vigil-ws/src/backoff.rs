//! Reconnection backoff policy.
//!
//! Exponential growth from a configured base delay, capped at a maximum,
//! with 0-1000 ms of jitter so a fleet of adapters does not reconnect in
//! lockstep after a venue-side outage.

use std::time::Duration;

/// Exponential backoff with jitter and an attempt budget.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Attempts before the connection is considered degraded (0 = never).
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter.
    ///
    /// attempt=1 -> base, attempt=2 -> 2*base, attempt=3 -> 4*base, capped.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Delay with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.raw_delay(attempt) + Duration::from_millis(jitter_ms())
    }

    /// Whether the attempt budget is spent.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Jitter in 0..1000 ms derived from the clock's sub-second noise.
fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_attempts: 5,
        };
        assert_eq!(policy.raw_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.raw_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.raw_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.raw_delay(7), Duration::from_millis(60_000)); // capped
    }

    #[test]
    fn test_exhaustion() {
        let policy = BackoffPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn test_infinite_budget() {
        let policy = BackoffPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!policy.exhausted(u32::MAX));
    }

    #[test]
    fn test_jitter_bounded() {
        for attempt in 1..5 {
            let policy = BackoffPolicy::default();
            let raw = policy.raw_delay(attempt);
            let jittered = policy.delay_for(attempt);
            assert!(jittered >= raw);
            assert!(jittered < raw + Duration::from_millis(1000));
        }
    }
}
