//! Hot state: overwrite-wins key-value projection.
//!
//! A single writer task consumes projection commands from a bounded
//! channel. Writes are best-effort: store failures are buffered up to a
//! bounded size (dropping oldest) and surface as a `hot_store_degraded`
//! health flag, never as backpressure. Every applied change publishes the
//! key on a broadcast topic so the UI can push updates.

use crate::error::{StorageError, StorageResult};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One hot-store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HotCommand {
    /// Replace a hash wholesale.
    PutHash {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Merge fields into a hash, keeping the others.
    MergeHash {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Remove one field from a hash.
    RemoveHashField { key: String, field: String },
    /// Append to an ordered sequence, trimming to `cap` newest entries.
    PushList {
        key: String,
        value: String,
        cap: usize,
    },
    AddToSet {
        key: String,
        member: String,
    },
    RemoveFromSet {
        key: String,
        member: String,
    },
    /// String value with an optional TTL (throttle markers).
    PutString {
        key: String,
        value: String,
        ttl_secs: Option<u64>,
    },
    Delete {
        key: String,
    },
}

impl HotCommand {
    /// The key this command touches (published on the change topic).
    pub fn key(&self) -> &str {
        match self {
            Self::PutHash { key, .. }
            | Self::MergeHash { key, .. }
            | Self::RemoveHashField { key, .. }
            | Self::PushList { key, .. }
            | Self::AddToSet { key, .. }
            | Self::RemoveFromSet { key, .. }
            | Self::PutString { key, .. }
            | Self::Delete { key } => key,
        }
    }
}

/// Hot key-value sink. One writer task per store instance.
pub trait HotStore: Send + Sync {
    fn apply(&self, command: &HotCommand) -> StorageResult<()>;

    /// Change topic: receives the key of every applied mutation.
    fn subscribe(&self) -> broadcast::Receiver<String>;

    fn get_hash(&self, key: &str) -> Option<HashMap<String, String>>;
    fn get_list(&self, key: &str) -> Option<Vec<String>>;
    fn get_set(&self, key: &str) -> Option<HashSet<String>>;
    fn get_string(&self, key: &str) -> Option<String>;
}

/// In-memory hot store used in-process and by the tests. The external
/// deployment swaps in a store speaking the same key layout.
pub struct MemoryHotStore {
    hashes: DashMap<String, HashMap<String, String>>,
    lists: DashMap<String, VecDeque<String>>,
    sets: DashMap<String, HashSet<String>>,
    strings: DashMap<String, (String, Option<Instant>)>,
    topic: broadcast::Sender<String>,
}

impl MemoryHotStore {
    pub fn new() -> Self {
        let (topic, _) = broadcast::channel(1024);
        Self {
            hashes: DashMap::new(),
            lists: DashMap::new(),
            sets: DashMap::new(),
            strings: DashMap::new(),
            topic,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for MemoryHotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HotStore for MemoryHotStore {
    fn apply(&self, command: &HotCommand) -> StorageResult<()> {
        match command {
            HotCommand::PutHash { key, fields } => {
                self.hashes
                    .insert(key.clone(), fields.iter().cloned().collect());
            }
            HotCommand::MergeHash { key, fields } => {
                let mut entry = self.hashes.entry(key.clone()).or_default();
                for (field, value) in fields {
                    entry.insert(field.clone(), value.clone());
                }
            }
            HotCommand::RemoveHashField { key, field } => {
                if let Some(mut entry) = self.hashes.get_mut(key) {
                    entry.remove(field);
                }
            }
            HotCommand::PushList { key, value, cap } => {
                let mut entry = self.lists.entry(key.clone()).or_default();
                entry.push_back(value.clone());
                while entry.len() > *cap {
                    entry.pop_front();
                }
            }
            HotCommand::AddToSet { key, member } => {
                self.sets
                    .entry(key.clone())
                    .or_default()
                    .insert(member.clone());
            }
            HotCommand::RemoveFromSet { key, member } => {
                if let Some(mut entry) = self.sets.get_mut(key) {
                    entry.remove(member);
                }
            }
            HotCommand::PutString {
                key,
                value,
                ttl_secs,
            } => {
                let expiry = ttl_secs.map(|s| Instant::now() + Duration::from_secs(s));
                self.strings.insert(key.clone(), (value.clone(), expiry));
            }
            HotCommand::Delete { key } => {
                self.hashes.remove(key);
                self.lists.remove(key);
                self.sets.remove(key);
                self.strings.remove(key);
            }
        }

        // No receivers is fine; the topic is best-effort.
        let _ = self.topic.send(command.key().to_string());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.topic.subscribe()
    }

    fn get_hash(&self, key: &str) -> Option<HashMap<String, String>> {
        self.hashes.get(key).map(|e| e.value().clone())
    }

    fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.lists.get(key).map(|e| e.iter().cloned().collect())
    }

    fn get_set(&self, key: &str) -> Option<HashSet<String>> {
        self.sets.get(key).map(|e| e.value().clone())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        let entry = self.strings.get(key)?;
        let (value, expiry) = entry.value();
        if expiry.is_some_and(|at| Instant::now() >= at) {
            return None;
        }
        Some(value.clone())
    }
}

/// Hot-writer tuning.
#[derive(Debug, Clone)]
pub struct HotWriterConfig {
    /// Commands buffered across store failures before dropping oldest.
    pub max_retry_buffer: usize,
    /// Retry cadence while degraded.
    pub retry_interval_ms: u64,
}

impl Default for HotWriterConfig {
    fn default() -> Self {
        Self {
            max_retry_buffer: 10_000,
            retry_interval_ms: 1_000,
        }
    }
}

/// Single writer task for one hot store.
pub struct HotWriter {
    store: Arc<dyn HotStore>,
    rx: mpsc::Receiver<HotCommand>,
    config: HotWriterConfig,
    degraded: Arc<AtomicBool>,
    retry: VecDeque<HotCommand>,
    dropped: u64,
}

impl HotWriter {
    pub fn new(
        store: Arc<dyn HotStore>,
        rx: mpsc::Receiver<HotCommand>,
        config: HotWriterConfig,
    ) -> Self {
        Self {
            store,
            rx,
            config,
            degraded: Arc::new(AtomicBool::new(false)),
            retry: VecDeque::new(),
            dropped: 0,
        }
    }

    /// The `hot_store_degraded` health flag.
    pub fn degraded_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.degraded)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut retry_tick =
            tokio::time::interval(Duration::from_millis(self.config.retry_interval_ms));
        retry_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    self.apply_or_buffer(command);
                }

                _ = retry_tick.tick(), if !self.retry.is_empty() => {
                    self.drain_retry();
                }
            }
        }

        // Drain whatever is still queued; hot state is recomputable, so a
        // failure here is only logged.
        while let Ok(command) = self.rx.try_recv() {
            self.apply_or_buffer(command);
        }
        self.drain_retry();
        if self.dropped > 0 {
            warn!(dropped = self.dropped, "Hot writer dropped commands while degraded");
        }
        info!("Hot writer shut down");
    }

    fn apply_or_buffer(&mut self, command: HotCommand) {
        if !self.retry.is_empty() {
            // Preserve per-key ordering: queue behind the failed commands.
            self.buffer(command);
            return;
        }
        if let Err(e) = self.store.apply(&command) {
            warn!(error = %e, "Hot store write failed, entering degraded mode");
            self.degraded.store(true, Ordering::Relaxed);
            self.buffer(command);
        }
    }

    fn buffer(&mut self, command: HotCommand) {
        if self.retry.len() >= self.config.max_retry_buffer {
            self.retry.pop_front();
            self.dropped += 1;
        }
        self.retry.push_back(command);
    }

    fn drain_retry(&mut self) {
        while let Some(command) = self.retry.front() {
            match self.store.apply(command) {
                Ok(()) => {
                    self.retry.pop_front();
                }
                Err(e) => {
                    debug!(error = %e, queued = self.retry.len(), "Hot store still failing");
                    return;
                }
            }
        }
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("Hot store recovered");
        }
    }
}

/// Producer-side helper: best-effort enqueue. A full channel drops the
/// command with a warning; hot state is recomputable from the next
/// snapshot.
pub fn offer(tx: &mpsc::Sender<HotCommand>, command: HotCommand) {
    if let Err(e) = tx.try_send(command) {
        match e {
            mpsc::error::TrySendError::Full(cmd) => {
                warn!(key = cmd.key(), "Hot projection channel full, dropping");
            }
            mpsc::error::TrySendError::Closed(_) => {}
        }
    }
}

impl From<broadcast::error::RecvError> for StorageError {
    fn from(e: broadcast::error::RecvError) -> Self {
        StorageError::HotStore(e.to_string())
    }
}
