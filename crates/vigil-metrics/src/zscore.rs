//! Rolling-window z-score engine.
//!
//! Statistically safe by construction: no value is emitted during warmup,
//! near-zero variance is guarded, and the window resets after data gaps
//! large enough to invalidate the prior distribution.

use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, info};
use vigil_core::{InstrumentId, MetricName, VenueId};

/// Z-score engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreConfig {
    /// Ring-buffer capacity.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Samples required before any z-score is emitted.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Flat-market guard: below this stdev the z-score is absent.
    #[serde(default = "default_min_std")]
    pub min_std: Decimal,
    /// Warmup progress is logged at most this often per state.
    #[serde(default = "default_warmup_log_interval_secs")]
    pub warmup_log_interval_secs: u64,
    /// Gaps at least this long reset the window.
    #[serde(default = "default_reset_on_gap_ms")]
    pub reset_on_gap_ms: i64,
}

fn default_window_size() -> usize {
    300
}

fn default_min_samples() -> usize {
    30
}

fn default_min_std() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_warmup_log_interval_secs() -> u64 {
    30
}

fn default_reset_on_gap_ms() -> i64 {
    5_000
}

impl Default for ZScoreConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            min_samples: default_min_samples(),
            min_std: default_min_std(),
            warmup_log_interval_secs: default_warmup_log_interval_secs(),
            reset_on_gap_ms: default_reset_on_gap_ms(),
        }
    }
}

/// Status projection for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScoreStatus {
    pub warmed_up: bool,
    pub sample_count: usize,
    pub min_samples: usize,
    pub progress_pct: u8,
}

/// Rolling state for one (metric, venue, instrument).
#[derive(Debug)]
pub struct ZScoreState {
    window: VecDeque<Decimal>,
    warmed_up: bool,
    last_warmup_log: Option<Duration>,
}

impl ZScoreState {
    fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            warmed_up: false,
            last_warmup_log: None,
        }
    }

    /// Append a sample and return its z-score, or `None` while warming up
    /// or guarded. The returned value is rounded to four fractional
    /// digits.
    fn add_sample(
        &mut self,
        value: Decimal,
        now_mono: Duration,
        config: &ZScoreConfig,
        label: &str,
    ) -> Option<Decimal> {
        if self.window.len() == config.window_size {
            self.window.pop_front();
        }
        self.window.push_back(value);

        let count = self.window.len();
        if count < config.min_samples {
            let should_log = match self.last_warmup_log {
                None => true,
                Some(last) => {
                    now_mono.saturating_sub(last)
                        >= Duration::from_secs(config.warmup_log_interval_secs)
                }
            };
            if should_log {
                self.last_warmup_log = Some(now_mono);
                debug!(
                    %label,
                    samples = count,
                    needed = config.min_samples,
                    "Z-score warming up"
                );
            }
            return None;
        }

        let n = Decimal::from(count as u64);
        let mean = self.window.iter().sum::<Decimal>() / n;
        let variance = self
            .window
            .iter()
            .map(|x| {
                let d = *x - mean;
                d * d
            })
            .sum::<Decimal>()
            / (n - Decimal::ONE);
        let stdev = variance.sqrt()?;

        if stdev < config.min_std {
            // Flat market: a breach here would be numerically meaningless.
            return None;
        }

        if !self.warmed_up {
            self.warmed_up = true;
            info!(%label, samples = count, "Z-score warmed up");
        }

        Some(((value - mean) / stdev).round_dp(4))
    }

    fn reset(&mut self, label: &str, reason: &str) {
        self.window.clear();
        self.warmed_up = false;
        self.last_warmup_log = None;
        info!(%label, %reason, "Z-score state reset");
    }

    fn status(&self, config: &ZScoreConfig) -> ZScoreStatus {
        let count = self.window.len();
        let progress = if config.min_samples == 0 {
            100
        } else {
            ((count * 100) / config.min_samples).min(100) as u8
        };
        ZScoreStatus {
            warmed_up: self.warmed_up,
            sample_count: count,
            min_samples: config.min_samples,
            progress_pct: progress,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }
}

type StateKey = (MetricName, VenueId, InstrumentId);

/// Owns every per-(metric, venue, instrument) rolling state.
///
/// Created lazily on first sample, cleared on gap reset, destroyed on
/// unsubscribe. Single-task ownership: no locks.
pub struct ZScoreEngine {
    config: ZScoreConfig,
    states: HashMap<StateKey, ZScoreState>,
}

impl ZScoreEngine {
    pub fn new(config: ZScoreConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ZScoreConfig {
        &self.config
    }

    /// Append a sample for one tracked metric.
    pub fn add_sample(
        &mut self,
        metric: MetricName,
        venue: VenueId,
        instrument: &InstrumentId,
        value: Decimal,
        now_mono: Duration,
    ) -> Option<Decimal> {
        let key = (metric, venue, instrument.clone());
        let state = self
            .states
            .entry(key)
            .or_insert_with(|| ZScoreState::new(self.config.window_size));
        let label = format!("{}:{}:{}", venue, instrument, metric);
        state.add_sample(value, now_mono, &self.config, &label)
    }

    /// Reset every metric state for one (venue, instrument). Called when a
    /// qualifying gap marker arrives.
    pub fn reset_market(&mut self, venue: VenueId, instrument: &InstrumentId, reason: &str) {
        for ((metric, v, inst), state) in self.states.iter_mut() {
            if *v == venue && inst == instrument {
                let label = format!("{}:{}:{}", v, inst, metric);
                state.reset(&label, reason);
            }
        }
    }

    /// Drop all state for one (venue, instrument) on unsubscribe.
    pub fn drop_market(&mut self, venue: VenueId, instrument: &InstrumentId) {
        self.states
            .retain(|(_, v, inst), _| !(*v == venue && inst == instrument));
    }

    /// Status projection for one state, if it exists.
    pub fn status(
        &self,
        metric: MetricName,
        venue: VenueId,
        instrument: &InstrumentId,
    ) -> Option<ZScoreStatus> {
        self.states
            .get(&(metric, venue, instrument.clone()))
            .map(|s| s.status(&self.config))
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}
