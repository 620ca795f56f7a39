//! Injectable clock.
//!
//! All timing decisions (persistence, escalation, throttling, gap
//! detection) read the monotonic clock; wall-clock time is only for audit
//! timestamps on records. Tests drive a `ManualClock`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock abstraction: monotonic time for decisions, wall time for audit.
pub trait Clock: Send + Sync {
    /// Monotonic time since some fixed origin.
    fn mono(&self) -> Duration;

    /// Wall-clock time for audit/log timestamps.
    fn wall(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

/// Production clock backed by `Instant` and `Utc::now`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn mono(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock advanced by hand. Wall time moves in lockstep with the
/// monotonic reading so durations computed from either agree.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

struct ManualState {
    mono: Duration,
    wall: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(start_wall: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                mono: Duration::ZERO,
                wall: start_wall,
            }),
        }
    }

    pub fn shared(start_wall: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(start_wall))
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.mono += by;
        state.wall += chrono::Duration::from_std(by).expect("duration in range");
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for ManualClock {
    fn mono(&self) -> Duration {
        self.state.lock().mono
    }

    fn wall(&self) -> DateTime<Utc> {
        self.state.lock().wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.mono();
        let b = clock.mono();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(Utc::now());
        let wall0 = clock.wall();

        clock.advance_secs(120);

        assert_eq!(clock.mono(), Duration::from_secs(120));
        assert_eq!((clock.wall() - wall0).num_seconds(), 120);
    }
}
