//! Sequence-gap detection.
//!
//! Venues assign sequence numbers globally, not per subscription, so
//! forward jumps are NORMAL and must not be reported. A gap exists only
//! when the sequence goes backwards or repeats. A strict monotonic check
//! here would produce thousands of false gaps per hour.

use vigil_core::GapReason;

/// Outcome of observing one sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqCheck {
    /// Normal forward progress (any jump size).
    Ok,
    /// Backwards or duplicate sequence; a gap marker must be emitted.
    Gap {
        reason: GapReason,
        prev: u64,
    },
}

/// Per-(venue, instrument) sequence tracker.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    prev: Option<u64>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the next sequence id.
    ///
    /// Duplicates (`seq == prev`) do not advance the tracker; regressions
    /// (`seq < prev`) rebase it so the stream can continue from the
    /// venue's new numbering.
    pub fn observe(&mut self, seq: u64) -> SeqCheck {
        match self.prev {
            None => {
                self.prev = Some(seq);
                SeqCheck::Ok
            }
            Some(prev) if seq == prev => SeqCheck::Gap {
                reason: GapReason::Duplicate,
                prev,
            },
            Some(prev) if seq < prev => {
                self.prev = Some(seq);
                SeqCheck::Gap {
                    reason: GapReason::SequenceRegression,
                    prev,
                }
            }
            Some(_) => {
                self.prev = Some(seq);
                SeqCheck::Ok
            }
        }
    }

    /// Forget the previous id (called across reconnects, where the venue
    /// may legitimately restart its numbering).
    pub fn reset(&mut self) {
        self.prev = None;
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.prev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_jumps_are_normal() {
        let mut guard = SequenceGuard::new();
        assert_eq!(guard.observe(100), SeqCheck::Ok);
        assert_eq!(guard.observe(101), SeqCheck::Ok);
        // Large forward jump: other subscriptions consumed the ids.
        assert_eq!(guard.observe(50_000), SeqCheck::Ok);
    }

    #[test]
    fn test_regression_is_a_gap() {
        let mut guard = SequenceGuard::new();
        guard.observe(100);
        assert_eq!(
            guard.observe(99),
            SeqCheck::Gap {
                reason: GapReason::SequenceRegression,
                prev: 100,
            }
        );
        // Tracker rebased: progress resumes from the new numbering.
        assert_eq!(guard.observe(100), SeqCheck::Ok);
    }

    #[test]
    fn test_duplicate_is_a_gap_without_progress() {
        let mut guard = SequenceGuard::new();
        guard.observe(100);
        assert_eq!(
            guard.observe(100),
            SeqCheck::Gap {
                reason: GapReason::Duplicate,
                prev: 100,
            }
        );
        // Re-delivery did not advance the tracker.
        assert_eq!(guard.last_seq(), Some(100));
        // The same duplicate again is still a gap.
        assert_eq!(
            guard.observe(100),
            SeqCheck::Gap {
                reason: GapReason::Duplicate,
                prev: 100,
            }
        );
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut guard = SequenceGuard::new();
        guard.observe(100);
        guard.reset();
        // First id after reset is never a gap, even if lower.
        assert_eq!(guard.observe(1), SeqCheck::Ok);
    }
}
