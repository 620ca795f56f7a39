//! Venue adapters for the vigil pipeline.
//!
//! One adapter per venue maintains a healthy subscription, normalizes the
//! wire format, detects sequence and silence gaps, joins ticker streams,
//! and falls back to REST polling while degraded. Everything leaving this
//! crate is validated and venue-agnostic.

pub mod adapter;
pub mod binance;
pub mod config;
pub mod error;
pub mod okx;
pub mod protocol;
pub mod rest;
pub mod sequence;

pub use adapter::{spawn, AdapterChannels, AdapterHandle, HealthProbe};
pub use binance::BinanceProtocol;
pub use config::{BackoffConfig, InstrumentSpec, VenueConfig};
pub use error::{VenueError, VenueResult};
pub use okx::OkxProtocol;
pub use protocol::{TickerUpdate, VenueEvent, VenueParser};
pub use sequence::{SeqCheck, SequenceGuard};
