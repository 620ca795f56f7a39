//! Application wiring and supervision.
//!
//! One long-running task per stage, connected by typed bounded channels:
//! adapters -> metrics engine -> detector -> storage writers, with a
//! health publisher on the side. Hot projections drop on overflow; cold
//! writes backpressure. Shutdown drains the pipeline under a hard
//! deadline.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::{
    AlertTransition, GapMarker, MetricSample, OrderBookSnapshot, SharedClock, SnapshotSource,
    SystemClock, TickerSnapshot,
};
use vigil_detector::{AnomalyDetector, LogDispatcher};
use vigil_metrics::MetricsEngine;
use vigil_storage::{
    offer, project, ColdRow, ColdWriter, ColdWriterConfig, HotCommand, HotStore, HotWriter,
    HotWriterConfig, JsonLinesColdStore, MemoryHotStore,
};
use vigil_telemetry::Metrics;
use vigil_venue::{AdapterChannels, AdapterHandle, BinanceProtocol, HealthProbe, OkxProtocol};

/// Detector input: samples and gaps on one channel so resets stay
/// ordered with the samples they precede.
enum DetectorInput {
    Sample(MetricSample),
    Gap(GapMarker),
}

/// Main application.
pub struct Application {
    config: AppConfig,
    clock: SharedClock,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: SystemClock::shared(),
        })
    }

    /// Startup probe for the cold store location (exit code 2 territory).
    fn check_dependencies(&self) -> AppResult<()> {
        let dir = std::path::Path::new(&self.config.storage.cold_dir);
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::DependencyUnavailable(format!("cold store dir: {e}")))?;
        let probe = dir.join(".vigil_probe");
        std::fs::write(&probe, b"ok")
            .map_err(|e| AppError::DependencyUnavailable(format!("cold store not writable: {e}")))?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    }

    /// Run until SIGINT/SIGTERM, then drain gracefully.
    pub async fn run(self) -> AppResult<()> {
        self.check_dependencies()?;

        let caps = self.config.channels.clone();
        let engine = MetricsEngine::new(self.config.engine_config()?, Arc::clone(&self.clock));
        let detector = AnomalyDetector::new(
            self.config.detector_config()?,
            Arc::clone(&self.clock),
            Arc::new(LogDispatcher),
        )?;
        let dedup_ttls = self.config.dedup_ttls()?;

        // Storage writers.
        let hot_store: Arc<dyn HotStore> = MemoryHotStore::shared();
        let (hot_tx, hot_rx) = mpsc::channel::<HotCommand>(caps.hot_projection);
        let hot_writer = HotWriter::new(Arc::clone(&hot_store), hot_rx, HotWriterConfig::default());
        let hot_degraded = hot_writer.degraded_flag();
        let writer_cancel = CancellationToken::new();
        let hot_join = tokio::spawn(hot_writer.run(writer_cancel.clone()));

        let (cold_tx, cold_rx) = mpsc::channel::<ColdRow>(caps.detector_to_storage);
        let cold_writer = ColdWriter::new(
            Box::new(JsonLinesColdStore::new(&self.config.storage.cold_dir)),
            cold_rx,
            ColdWriterConfig {
                batch_size: self.config.storage.cold_batch_size,
                flush_interval_ms: self.config.storage.cold_flush_interval_ms,
                fallback_path: std::path::Path::new(&self.config.storage.cold_dir)
                    .join("fallback_queue.jsonl"),
                ..Default::default()
            },
        );
        let cold_depth = cold_writer.queue_depth();
        let cold_join = tokio::spawn(cold_writer.run(writer_cancel.clone()));

        // Venue adapters.
        let (book_tx, book_rx) = mpsc::channel::<OrderBookSnapshot>(caps.adapter_to_engine);
        let (ticker_tx, ticker_rx) = mpsc::channel::<TickerSnapshot>(caps.adapter_to_engine);
        let (gap_tx, gap_rx) = mpsc::channel::<GapMarker>(caps.adapter_to_engine);
        let adapter_channels = AdapterChannels {
            books: book_tx,
            tickers: ticker_tx,
            gaps: gap_tx,
        };

        let mut adapters: Vec<AdapterHandle> = Vec::new();
        for venue_config in &self.config.venues {
            let handle = match venue_config.venue {
                vigil_core::VenueId::Binance => vigil_venue::spawn(
                    venue_config.clone(),
                    BinanceProtocol::new(venue_config.clone()),
                    adapter_channels.clone(),
                ),
                vigil_core::VenueId::Okx => vigil_venue::spawn(
                    venue_config.clone(),
                    OkxProtocol::new(venue_config.clone()),
                    adapter_channels.clone(),
                ),
            };
            info!(venue = %handle.venue(), "Adapter spawned");
            adapters.push(handle);
        }
        // Only the adapters hold senders now, so channel closure tracks
        // adapter shutdown.
        drop(adapter_channels);

        // Engine and detector stages.
        let (detector_tx, detector_rx) = mpsc::channel::<DetectorInput>(caps.engine_to_detector);
        let engine_join = tokio::spawn(engine_task(
            engine,
            book_rx,
            ticker_rx,
            gap_rx,
            detector_tx,
            hot_tx.clone(),
            cold_tx.clone(),
            self.config.storage.zscore_buffer_cap,
            self.config.storage.gap_list_cap,
        ));
        let detector_join = tokio::spawn(detector_task(
            detector,
            detector_rx,
            hot_tx.clone(),
            cold_tx.clone(),
            dedup_ttls,
        ));

        // Health publisher.
        let probes: Vec<HealthProbe> = adapters.iter().map(|a| a.health_probe()).collect();
        let health_cancel = CancellationToken::new();
        let health_join = tokio::spawn(health_task(
            probes,
            hot_degraded,
            cold_depth,
            hot_tx,
            cold_tx,
            health_cancel.clone(),
        ));

        info!("Pipeline running");
        let mut cold_join = cold_join;
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received, draining");
            }
            result = &mut cold_join => {
                // The system of record stopped outside of shutdown: this
                // is the unrecoverable storage path.
                warn!(?result, "Cold writer exited unexpectedly");
                return Err(AppError::Io(
                    "cold store writer exited outside of shutdown".to_string(),
                ));
            }
        }

        let deadline = Duration::from_secs(self.config.shutdown_deadline_secs);
        let drain = async move {
            for adapter in adapters {
                adapter.shutdown().await;
            }
            join_quiet(engine_join, "engine").await;
            join_quiet(detector_join, "detector").await;
            health_cancel.cancel();
            join_quiet(health_join, "health").await;
            // All senders dropped: writers drain their channels and flush.
            join_quiet(hot_join, "hot writer").await;
            join_quiet(cold_join, "cold writer").await;
        };

        if tokio::time::timeout(deadline, drain).await.is_err() {
            warn!(
                deadline_secs = self.config.shutdown_deadline_secs,
                "Drain deadline exceeded, aborting remaining tasks"
            );
            writer_cancel.cancel();
        }

        info!("Shutdown complete");
        Ok(())
    }
}

async fn join_quiet(handle: JoinHandle<()>, stage: &str) {
    if let Err(e) = handle.await {
        warn!(stage, error = %e, "Stage task panicked");
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installs at startup")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Metrics engine stage: books, tickers, and gaps in; samples out.
/// Gaps are drained first so a reset always lands before the samples
/// that follow it.
#[allow(clippy::too_many_arguments)]
async fn engine_task(
    mut engine: MetricsEngine,
    mut books: mpsc::Receiver<OrderBookSnapshot>,
    mut tickers: mpsc::Receiver<TickerSnapshot>,
    mut gaps: mpsc::Receiver<GapMarker>,
    detector_tx: mpsc::Sender<DetectorInput>,
    hot_tx: mpsc::Sender<HotCommand>,
    cold_tx: mpsc::Sender<ColdRow>,
    zscore_buffer_cap: usize,
    gap_list_cap: usize,
) {
    let mut books_open = true;
    let mut tickers_open = true;
    let mut gaps_open = true;

    loop {
        tokio::select! {
            biased;

            gap = gaps.recv(), if gaps_open => {
                match gap {
                    None => gaps_open = false,
                    Some(gap) => {
                        Metrics::gap(gap.venue.as_str(), gap.reason.as_str());
                        engine.on_gap(&gap);
                        offer(&hot_tx, project::gap(&gap, gap_list_cap));
                        if cold_tx.send(ColdRow::Gap(gap.clone())).await.is_err() {
                            break;
                        }
                        if detector_tx.send(DetectorInput::Gap(gap)).await.is_err() {
                            break;
                        }
                    }
                }
            }

            book = books.recv(), if books_open => {
                match book {
                    None => books_open = false,
                    Some(book) => {
                        let started = Instant::now();
                        let samples = engine.on_book(&book);
                        Metrics::engine_latency(
                            book.venue.as_str(),
                            started.elapsed().as_micros() as f64,
                        );
                        Metrics::message(book.venue.as_str(), "book");
                        if book.source == SnapshotSource::Stream {
                            let lag = (book.received_at - book.venue_time).num_milliseconds();
                            Metrics::feed_lag(book.venue.as_str(), lag as f64);
                        }

                        offer(&hot_tx, project::book(&book));
                        if cold_tx.send(ColdRow::Book(book)).await.is_err() {
                            break;
                        }
                        if forward_samples(
                            samples,
                            &detector_tx,
                            &hot_tx,
                            &cold_tx,
                            zscore_buffer_cap,
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                    }
                }
            }

            ticker = tickers.recv(), if tickers_open => {
                match ticker {
                    None => tickers_open = false,
                    Some(ticker) => {
                        let samples = engine.on_ticker(&ticker);
                        Metrics::message(ticker.venue.as_str(), "ticker");
                        if cold_tx.send(ColdRow::Ticker(ticker)).await.is_err() {
                            break;
                        }
                        if forward_samples(
                            samples,
                            &detector_tx,
                            &hot_tx,
                            &cold_tx,
                            zscore_buffer_cap,
                        )
                        .await
                        .is_err()
                        {
                            break;
                        }
                    }
                }
            }

            else => break,
        }
    }

    info!("Engine stage shut down");
}

/// Forward derived samples to the detector and both stores. An `Err`
/// means a downstream channel closed (shutdown in progress).
async fn forward_samples(
    samples: Vec<MetricSample>,
    detector_tx: &mpsc::Sender<DetectorInput>,
    hot_tx: &mpsc::Sender<HotCommand>,
    cold_tx: &mpsc::Sender<ColdRow>,
    zscore_buffer_cap: usize,
) -> Result<(), ()> {
    for sample in samples {
        Metrics::sample(sample.venue.as_str(), &sample.metric.wire_name());
        for command in project::zscore(&sample, zscore_buffer_cap) {
            offer(hot_tx, command);
        }
        if cold_tx.send(ColdRow::Metric(sample.clone())).await.is_err() {
            return Err(());
        }
        if detector_tx
            .send(DetectorInput::Sample(sample))
            .await
            .is_err()
        {
            return Err(());
        }
    }
    Ok(())
}

/// Detector stage: evaluation plus the 1 Hz escalation/timeout scan.
async fn detector_task(
    mut detector: AnomalyDetector,
    mut inputs: mpsc::Receiver<DetectorInput>,
    hot_tx: mpsc::Sender<HotCommand>,
    cold_tx: mpsc::Sender<ColdRow>,
    dedup_ttls: HashMap<String, u64>,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let events = tokio::select! {
            input = inputs.recv() => {
                match input {
                    None => break,
                    Some(DetectorInput::Sample(sample)) => detector.on_sample(&sample),
                    Some(DetectorInput::Gap(gap)) => detector.on_gap(&gap),
                }
            }
            _ = tick.tick() => detector.on_tick(),
        };

        for event in events {
            Metrics::alert(&event.alert.alert_type, event.transition.as_str());
            let ttl = match event.transition {
                AlertTransition::Fired => dedup_ttls.get(&event.alert.alert_type).copied(),
                _ => None,
            };
            for command in project::alert_event(&event, ttl) {
                offer(&hot_tx, command);
            }
            if cold_tx.send(ColdRow::Alert(event)).await.is_err() {
                // Storage is gone; shutdown is in progress.
                return;
            }
        }
        Metrics::active_alerts(detector.active_count() as i64);
    }

    // Final scan so escalations pending at shutdown are not lost.
    for event in detector.on_tick() {
        let _ = cold_tx.send(ColdRow::Alert(event)).await;
    }
    info!("Detector stage shut down");
}

/// Health publisher: projects per-venue health and storage health to the
/// hot store every second and to the cold store once a minute.
async fn health_task(
    probes: Vec<HealthProbe>,
    hot_degraded: Arc<AtomicBool>,
    cold_depth: Arc<AtomicU64>,
    hot_tx: mpsc::Sender<HotCommand>,
    cold_tx: mpsc::Sender<ColdRow>,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }
        ticks += 1;

        for probe in &probes {
            let snapshot = probe.snapshot();
            Metrics::venue_status(snapshot.venue.as_str(), snapshot.status.as_str());
            Metrics::feed_lag(snapshot.venue.as_str(), snapshot.lag_ms as f64);
            offer(&hot_tx, project::health(&snapshot));

            if ticks % 60 == 0 && cold_tx.send(ColdRow::Health(snapshot)).await.is_err() {
                return;
            }
        }

        Metrics::hot_store_degraded(hot_degraded.load(Ordering::Relaxed));
        Metrics::cold_queue_depth(cold_depth.load(Ordering::Relaxed) as i64);
    }

    info!("Health publisher shut down");
}
