//! Cold store: append-only time-series history.
//!
//! The system of record. Rows are batched (size and interval bounded),
//! appended to date-partitioned JSON Lines files per table, retried with
//! backoff on failure, and spilled to an on-disk fallback queue rather
//! than dropped. Queue depth is reported in health. Upstream applies
//! backpressure through the bounded input channel; cold data is never
//! silently lost.

use crate::error::StorageResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{
    AlertEvent, GapMarker, HealthSnapshot, MetricName, MetricSample, OrderBookSnapshot,
    TickerSnapshot,
};

/// One append-only row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColdRow {
    Book(OrderBookSnapshot),
    Metric(MetricSample),
    Alert(AlertEvent),
    Gap(GapMarker),
    Ticker(TickerSnapshot),
    Health(HealthSnapshot),
}

impl ColdRow {
    /// Time-bucketed table this row lands in.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Book(_) => "orderbook_snapshots",
            Self::Metric(sample) => match sample.metric {
                MetricName::BasisAbs | MetricName::BasisBps | MetricName::DivergenceBps => {
                    "basis_metrics"
                }
                _ => "metrics",
            },
            Self::Alert(_) => "alerts",
            Self::Gap(_) => "data_gaps",
            Self::Ticker(_) => "ticker_snapshots",
            Self::Health(_) => "health_snapshots",
        }
    }
}

/// Cold sink. Implementations append; they never update in place.
pub trait ColdStore: Send {
    fn append(&mut self, rows: &[ColdRow]) -> StorageResult<()>;
}

struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
}

/// Date-partitioned JSON Lines store: `{table}_{YYYY-MM-DD}.jsonl` under
/// the base directory. Append mode throughout, so interrupted writes only
/// cost individual lines.
pub struct JsonLinesColdStore {
    base_dir: PathBuf,
    active: HashMap<&'static str, ActiveFile>,
}

impl JsonLinesColdStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create cold store directory");
        }
        Self {
            base_dir,
            active: HashMap::new(),
        }
    }

    fn writer_for(&mut self, table: &'static str, date: &str) -> StorageResult<&mut ActiveFile> {
        let needs_rotation = self
            .active
            .get(table)
            .is_some_and(|active| active.date != date);
        if needs_rotation {
            if let Some(mut old) = self.active.remove(table) {
                let _ = old.writer.flush();
                info!(table, date = %old.date, "Rotated cold store file");
            }
        }

        if !self.active.contains_key(table) {
            let path = self.base_dir.join(format!("{table}_{date}.jsonl"));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.active.insert(
                table,
                ActiveFile {
                    writer: BufWriter::new(file),
                    date: date.to_string(),
                },
            );
        }
        Ok(self.active.get_mut(table).expect("inserted above"))
    }
}

impl ColdStore for JsonLinesColdStore {
    fn append(&mut self, rows: &[ColdRow]) -> StorageResult<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        for row in rows {
            let line = serde_json::to_string(row)?;
            let active = self.writer_for(row.table(), &date)?;
            writeln!(active.writer, "{line}")?;
        }
        for active in self.active.values_mut() {
            active.writer.flush()?;
        }
        Ok(())
    }
}

/// Cold-writer tuning.
#[derive(Debug, Clone)]
pub struct ColdWriterConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    /// Append retries before spilling to the fallback queue.
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// On-disk fallback queue location.
    pub fallback_path: PathBuf,
}

impl Default for ColdWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            flush_interval_ms: 1_000,
            retry_attempts: 3,
            retry_base_delay_ms: 100,
            fallback_path: PathBuf::from("./data/cold_fallback.jsonl"),
        }
    }
}

/// Single writer task for the cold store.
pub struct ColdWriter {
    store: Box<dyn ColdStore>,
    rx: mpsc::Receiver<ColdRow>,
    config: ColdWriterConfig,
    buffer: Vec<ColdRow>,
    queue_depth: Arc<AtomicU64>,
}

impl ColdWriter {
    pub fn new(
        store: Box<dyn ColdStore>,
        rx: mpsc::Receiver<ColdRow>,
        config: ColdWriterConfig,
    ) -> Self {
        let queue_depth = Arc::new(AtomicU64::new(0));
        let mut writer = Self {
            store,
            rx,
            config,
            buffer: Vec::new(),
            queue_depth,
        };
        // A fallback queue left by a previous run counts toward depth
        // immediately.
        writer
            .queue_depth
            .store(writer.fallback_len(), Ordering::Relaxed);
        writer
    }

    /// Fallback-queue depth for the health projection.
    pub fn queue_depth(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.queue_depth)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut flush_tick =
            tokio::time::interval(Duration::from_millis(self.config.flush_interval_ms));
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                row = self.rx.recv() => {
                    let Some(row) = row else { break };
                    self.buffer.push(row);
                    if self.buffer.len() >= self.config.batch_size {
                        self.flush().await;
                    }
                }

                _ = flush_tick.tick() => {
                    self.flush().await;
                }
            }
        }

        // Drain: pending rows flow through to the store before exit.
        while let Ok(row) = self.rx.try_recv() {
            self.buffer.push(row);
        }
        self.flush().await;
        info!("Cold writer shut down");
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            self.try_drain_fallback();
            return;
        }
        let rows = std::mem::take(&mut self.buffer);

        let mut attempt = 0u32;
        loop {
            match self.store.append(&rows) {
                Ok(()) => {
                    debug!(rows = rows.len(), "Flushed cold batch");
                    self.try_drain_fallback();
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.retry_attempts {
                        warn!(
                            error = %e,
                            rows = rows.len(),
                            "Cold append failed past retry budget, spilling to fallback queue"
                        );
                        self.spill(rows);
                        return;
                    }
                    let delay = self.config.retry_base_delay_ms
                        * (1u64 << attempt.saturating_sub(1).min(10));
                    warn!(error = %e, attempt, delay_ms = delay, "Cold append failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    fn spill(&mut self, rows: Vec<ColdRow>) {
        let result = (|| -> StorageResult<()> {
            if let Some(parent) = self.config.fallback_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.config.fallback_path)?;
            let mut writer = BufWriter::new(file);
            for row in &rows {
                writeln!(writer, "{}", serde_json::to_string(row)?)?;
            }
            writer.flush()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.queue_depth
                    .fetch_add(rows.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                // Both the store and the local disk are failing; this is
                // the storage-fatal path. Keep the rows buffered so
                // backpressure reaches the adapters.
                warn!(error = %e, "Fallback queue write failed, holding batch");
                self.buffer = rows;
            }
        }
    }

    fn fallback_len(&self) -> u64 {
        let Ok(file) = File::open(&self.config.fallback_path) else {
            return 0;
        };
        BufReader::new(file).lines().count() as u64
    }

    /// After a healthy flush, replay the fallback queue into the store.
    fn try_drain_fallback(&mut self) {
        if self.queue_depth.load(Ordering::Relaxed) == 0 {
            return;
        }
        let rows: Vec<ColdRow> = {
            let Ok(file) = File::open(&self.config.fallback_path) else {
                return;
            };
            BufReader::new(file)
                .lines()
                .map_while(Result::ok)
                .filter_map(|line| serde_json::from_str(&line).ok())
                .collect()
        };
        if rows.is_empty() {
            let _ = std::fs::remove_file(&self.config.fallback_path);
            self.queue_depth.store(0, Ordering::Relaxed);
            return;
        }

        match self.store.append(&rows) {
            Ok(()) => {
                info!(rows = rows.len(), "Replayed cold fallback queue");
                let _ = std::fs::remove_file(&self.config.fallback_path);
                self.queue_depth.store(0, Ordering::Relaxed);
            }
            Err(e) => {
                debug!(error = %e, "Fallback replay failed, keeping queue");
            }
        }
    }
}
