//! Microstructure metrics for the vigil pipeline.
//!
//! Decimal-exact order-book math, a freshness-bounded pair tracker for
//! basis and cross-venue divergence, and a rolling-window z-score engine
//! with warmup, flat-market, and gap-reset guards.

pub mod book_math;
pub mod engine;
pub mod error;
pub mod pairs;
pub mod zscore;

pub use book_math::DepthWindow;
pub use engine::{EngineConfig, MetricsEngine};
pub use error::{MetricsError, MetricsResult};
pub use pairs::{PairKind, PairOutput, PairSpec, PairTracker};
pub use zscore::{ZScoreConfig, ZScoreEngine, ZScoreStatus};
