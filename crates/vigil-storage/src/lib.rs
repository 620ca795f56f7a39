//! Storage projections for the vigil pipeline.
//!
//! Hot: overwrite-wins key-value state with a change topic, written
//! best-effort by a single writer task. Cold: append-only time-series
//! history with batching, retry, and an on-disk fallback queue — the
//! system of record.

pub mod cold;
pub mod error;
pub mod hot;
pub mod keys;
pub mod project;

pub use cold::{ColdRow, ColdStore, ColdWriter, ColdWriterConfig, JsonLinesColdStore};
pub use error::{StorageError, StorageResult};
pub use hot::{offer, HotCommand, HotStore, HotWriter, HotWriterConfig, MemoryHotStore};
