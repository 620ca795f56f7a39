//! Venue adapter task.
//!
//! One adapter per venue owns the connection, decodes frames, guards
//! sequence numbers, joins ticker streams, records gaps, and emits
//! normalized snapshots on its output channels. While degraded it polls
//! REST at the configured cadence until streaming resumes.

use crate::config::VenueConfig;
use crate::protocol::{TickerUpdate, VenueEvent, VenueParser};
use crate::rest;
use crate::sequence::{SeqCheck, SequenceGuard};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{
    GapMarker, GapReason, HealthSnapshot, InstrumentId, OrderBookSnapshot, Px, Qty,
    TickerSnapshot, VenueId, VenueStatus,
};
use vigil_ws::{ConnEvent, ConnectionConfig, ConnectionManager, ConnectionState, WireProtocol};

/// Output channels handed to the adapter at spawn time.
///
/// All three are bounded; the adapter applies backpressure by awaiting
/// sends, which eventually stalls the socket read and surfaces as a gap.
#[derive(Clone)]
pub struct AdapterChannels {
    pub books: mpsc::Sender<OrderBookSnapshot>,
    pub tickers: mpsc::Sender<TickerSnapshot>,
    pub gaps: mpsc::Sender<GapMarker>,
}

/// Mutable health state shared with the handle.
struct HealthState {
    status: VenueStatus,
    last_message_at: Option<DateTime<Utc>>,
    message_count: u64,
    lag_ms: i64,
    reconnect_count: u32,
    gap_times: VecDeque<DateTime<Utc>>,
}

impl HealthState {
    fn new() -> Self {
        Self {
            status: VenueStatus::Disconnected,
            last_message_at: None,
            message_count: 0,
            lag_ms: 0,
            reconnect_count: 0,
            gap_times: VecDeque::new(),
        }
    }

    fn record_gap(&mut self, at: DateTime<Utc>) {
        self.gap_times.push_back(at);
        let horizon = at - ChronoDuration::hours(1);
        while self.gap_times.front().is_some_and(|t| *t < horizon) {
            self.gap_times.pop_front();
        }
    }

    fn snapshot(&self, venue: VenueId) -> HealthSnapshot {
        HealthSnapshot {
            venue,
            status: self.status,
            last_message_at: self.last_message_at,
            message_count: self.message_count,
            lag_ms: self.lag_ms,
            reconnect_count: self.reconnect_count,
            gaps_last_hour: self.gap_times.len() as u32,
        }
    }
}

/// Per-instrument stream gate: sequence guard plus activity tracking for
/// the time-based gap rule.
struct StreamGate {
    instrument: InstrumentId,
    guard: SequenceGuard,
    last_activity: DateTime<Utc>,
}

impl StreamGate {
    fn new(instrument: InstrumentId, now: DateTime<Utc>) -> Self {
        Self {
            instrument,
            guard: SequenceGuard::new(),
            last_activity: now,
        }
    }

    /// Observe a streamed book. Returns an optional gap marker and whether
    /// the snapshot should be forwarded downstream.
    ///
    /// Duplicates are marked but not forwarded (no forward progress);
    /// regressions are marked and then forwarded, since the rebased stream
    /// is valid data.
    fn observe_book(
        &mut self,
        venue: VenueId,
        snapshot: &OrderBookSnapshot,
    ) -> (Option<GapMarker>, bool) {
        let check = self.guard.observe(snapshot.sequence_id);
        let started_at = self.last_activity;
        self.last_activity = snapshot.received_at;

        match check {
            SeqCheck::Ok => (None, true),
            SeqCheck::Gap { reason, prev } => {
                let marker = GapMarker {
                    venue,
                    instrument: self.instrument.clone(),
                    started_at,
                    ended_at: snapshot.received_at,
                    reason,
                    seq_before: Some(prev),
                    seq_after: Some(snapshot.sequence_id),
                };
                let forward = reason != GapReason::Duplicate;
                (Some(marker), forward)
            }
        }
    }

    /// Time-based gap check. Emits at detection time and rebases the
    /// activity clock so a continuing outage produces one marker per
    /// silence threshold, not one per tick.
    fn check_silence(
        &mut self,
        venue: VenueId,
        now: DateTime<Utc>,
        threshold_ms: i64,
    ) -> Option<GapMarker> {
        if (now - self.last_activity).num_milliseconds() < threshold_ms {
            return None;
        }
        let marker = GapMarker {
            venue,
            instrument: self.instrument.clone(),
            started_at: self.last_activity,
            ended_at: now,
            reason: GapReason::Timeout,
            seq_before: self.guard.last_seq(),
            seq_after: None,
        };
        self.last_activity = now;
        Some(marker)
    }

    /// Reconnect gap: boundaries are (last message, first post-reconnect).
    /// The sequence guard forgets its history because venues may restart
    /// numbering on a new session.
    fn on_reconnect(&mut self, venue: VenueId, now: DateTime<Utc>) -> GapMarker {
        let marker = GapMarker {
            venue,
            instrument: self.instrument.clone(),
            started_at: self.last_activity,
            ended_at: now,
            reason: GapReason::Disconnect,
            seq_before: self.guard.last_seq(),
            seq_after: None,
        };
        self.guard.reset();
        self.last_activity = now;
        marker
    }
}

/// Joins the partial ticker streams (last/volume, mark, index, funding)
/// into one snapshot per instrument.
#[derive(Default)]
struct TickerAssembly {
    last_price: Option<Px>,
    mark_price: Option<Px>,
    index_price: Option<Px>,
    volume_24h: Option<Qty>,
    funding_rate: Option<rust_decimal::Decimal>,
    next_funding_at: Option<DateTime<Utc>>,
    venue_time: Option<DateTime<Utc>>,
}

impl TickerAssembly {
    fn merge(&mut self, update: &TickerUpdate) {
        if update.last_price.is_some() {
            self.last_price = update.last_price;
        }
        if update.mark_price.is_some() {
            self.mark_price = update.mark_price;
        }
        if update.index_price.is_some() {
            self.index_price = update.index_price;
        }
        if update.volume_24h.is_some() {
            self.volume_24h = update.volume_24h;
        }
        if update.funding_rate.is_some() {
            self.funding_rate = update.funding_rate;
        }
        if update.next_funding_at.is_some() {
            self.next_funding_at = update.next_funding_at;
        }
        self.venue_time = Some(update.venue_time);
    }

    /// Complete once the primary ticker stream has arrived.
    fn snapshot(
        &self,
        venue: VenueId,
        instrument: InstrumentId,
        received_at: DateTime<Utc>,
    ) -> Option<TickerSnapshot> {
        Some(TickerSnapshot {
            venue,
            instrument,
            venue_time: self.venue_time?,
            received_at,
            last_price: self.last_price?,
            mark_price: self.mark_price,
            index_price: self.index_price,
            volume_24h: self.volume_24h?,
            funding_rate: self.funding_rate,
            next_funding_at: self.next_funding_at,
        })
    }
}

/// Cloneable health query, detached from the handle so a publisher task
/// can poll while the handle retains shutdown ownership.
#[derive(Clone)]
pub struct HealthProbe {
    venue: VenueId,
    state: Arc<RwLock<HealthState>>,
}

impl HealthProbe {
    pub fn venue(&self) -> VenueId {
        self.venue
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.state.read().snapshot(self.venue)
    }
}

/// Handle to a spawned adapter: health query and shutdown.
pub struct AdapterHandle {
    venue: VenueId,
    cancel: CancellationToken,
    join: JoinHandle<()>,
    health: Arc<RwLock<HealthState>>,
}

impl AdapterHandle {
    pub fn venue(&self) -> VenueId {
        self.venue
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.read().snapshot(self.venue)
    }

    pub fn health_probe(&self) -> HealthProbe {
        HealthProbe {
            venue: self.venue,
            state: Arc::clone(&self.health),
        }
    }

    /// Close the connection and complete all output streams.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!(venue = %self.venue, error = %e, "Adapter task panicked during shutdown");
        }
    }
}

/// Spawn the adapter task for one venue.
pub fn spawn<P>(config: VenueConfig, protocol: P, channels: AdapterChannels) -> AdapterHandle
where
    P: WireProtocol + VenueParser,
{
    let venue = config.venue;
    let protocol = Arc::new(protocol);
    let cancel = CancellationToken::new();
    let health = Arc::new(RwLock::new(HealthState::new()));

    let (event_tx, event_rx) = mpsc::channel(1024);
    let conn = Arc::new(ConnectionManager::new(
        Arc::clone(&protocol),
        ConnectionConfig {
            backoff: (&config.backoff).into(),
        },
        event_tx,
    ));

    let conn_task = {
        let conn = Arc::clone(&conn);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.run(cancel).await {
                warn!(error = %e, "Connection loop exited with error");
            }
        })
    };

    let join = tokio::spawn(run_adapter(
        config,
        protocol,
        event_rx,
        channels,
        Arc::clone(&health),
        cancel.clone(),
        conn_task,
    ));

    AdapterHandle {
        venue,
        cancel,
        join,
        health,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_adapter<P>(
    config: VenueConfig,
    protocol: Arc<P>,
    mut events: mpsc::Receiver<ConnEvent>,
    channels: AdapterChannels,
    health: Arc<RwLock<HealthState>>,
    cancel: CancellationToken,
    conn_task: JoinHandle<()>,
) where
    P: WireProtocol + VenueParser,
{
    let venue = config.venue;
    let now = Utc::now();

    let mut gates: HashMap<InstrumentId, StreamGate> = config
        .instruments
        .iter()
        .map(|spec| (spec.id.clone(), StreamGate::new(spec.id.clone(), now)))
        .collect();
    let mut assemblies: HashMap<InstrumentId, TickerAssembly> = HashMap::new();
    let mut polled_seq: HashMap<InstrumentId, u64> = HashMap::new();

    let mut had_disconnect = false;
    let mut degraded = false;
    let rest_client = reqwest::Client::new();

    let mut watchdog = tokio::time::interval(Duration::from_secs(1));
    watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut poller = tokio::time::interval(Duration::from_millis(config.rest_poll_interval_ms));
    poller.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    'main: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ConnEvent::StateChanged(state) => {
                        handle_state_change(
                            venue,
                            state,
                            &mut had_disconnect,
                            &mut degraded,
                            &mut gates,
                            &channels,
                            &health,
                        )
                        .await;
                    }
                    ConnEvent::Frame { text, received_at } => {
                        match protocol.parse(&text, received_at) {
                            Ok(parsed) => {
                                for item in parsed {
                                    handle_event(
                                        venue,
                                        item,
                                        received_at,
                                        &mut gates,
                                        &mut assemblies,
                                        &channels,
                                        &health,
                                    )
                                    .await;
                                }
                            }
                            Err(e) => {
                                // Per-message failure: drop, log, continue.
                                warn!(venue = %venue, error = %e, "Dropping unparseable frame");
                            }
                        }
                    }
                }
            }

            _ = watchdog.tick() => {
                if degraded {
                    continue;
                }
                let now = Utc::now();
                for gate in gates.values_mut() {
                    if let Some(marker) =
                        gate.check_silence(venue, now, config.silence_gap_ms as i64)
                    {
                        info!(
                            venue = %venue,
                            instrument = %marker.instrument,
                            silence_ms = marker.duration_ms(),
                            "Time-based gap detected"
                        );
                        emit_gap(marker, &channels, &health).await;
                    }
                }
            }

            _ = poller.tick(), if degraded => {
                for spec in &config.instruments {
                    match rest::fetch_book(&rest_client, &config, spec).await {
                        Ok(snapshot) => {
                            // Skip unchanged polls; a venue serving the same
                            // book twice is not a sequence gap.
                            let prev = polled_seq.get(&spec.id).copied();
                            if prev == Some(snapshot.sequence_id) {
                                continue;
                            }
                            polled_seq.insert(spec.id.clone(), snapshot.sequence_id);
                            if let Some(gate) = gates.get_mut(&spec.id) {
                                gate.last_activity = snapshot.received_at;
                            }
                            record_message(&health, None);
                            if channels.books.send(snapshot).await.is_err() {
                                break 'main;
                            }
                        }
                        Err(e) => {
                            warn!(venue = %venue, instrument = %spec.id, error = %e, "REST poll failed");
                        }
                    }
                }
            }
        }
    }

    conn_task.abort();
    health.write().status = VenueStatus::Disconnected;
    info!(venue = %venue, "Adapter shut down");
    // Output streams complete when the senders drop here.
}

async fn handle_state_change(
    venue: VenueId,
    state: ConnectionState,
    had_disconnect: &mut bool,
    degraded: &mut bool,
    gates: &mut HashMap<InstrumentId, StreamGate>,
    channels: &AdapterChannels,
    health: &Arc<RwLock<HealthState>>,
) {
    let status = match state {
        ConnectionState::Streaming => VenueStatus::Connected,
        ConnectionState::Degraded => VenueStatus::Degraded,
        ConnectionState::Disconnected => VenueStatus::Disconnected,
        _ => VenueStatus::Reconnecting,
    };

    {
        let mut h = health.write();
        h.status = status;
        if state == ConnectionState::Reconnecting || state == ConnectionState::Degraded {
            h.reconnect_count += 1;
        }
    }

    match state {
        ConnectionState::Reconnecting | ConnectionState::Degraded | ConnectionState::Disconnected => {
            *had_disconnect = true;
            *degraded = state == ConnectionState::Degraded;
        }
        ConnectionState::Streaming => {
            *degraded = false;
            if *had_disconnect {
                *had_disconnect = false;
                let now = Utc::now();
                for gate in gates.values_mut() {
                    let marker = gate.on_reconnect(venue, now);
                    emit_gap(marker, channels, health).await;
                }
            }
        }
        _ => {}
    }
}

async fn handle_event(
    venue: VenueId,
    event: VenueEvent,
    received_at: DateTime<Utc>,
    gates: &mut HashMap<InstrumentId, StreamGate>,
    assemblies: &mut HashMap<InstrumentId, TickerAssembly>,
    channels: &AdapterChannels,
    health: &Arc<RwLock<HealthState>>,
) {
    match event {
        VenueEvent::Book(snapshot) => {
            let Some(gate) = gates.get_mut(&snapshot.instrument) else {
                debug!(instrument = %snapshot.instrument, "Book for unwatched instrument");
                return;
            };

            let lag_ms = (snapshot.received_at - snapshot.venue_time).num_milliseconds();
            record_message(health, Some(lag_ms));

            let (marker, forward) = gate.observe_book(venue, &snapshot);
            if let Some(marker) = marker {
                warn!(
                    venue = %venue,
                    instrument = %marker.instrument,
                    reason = %marker.reason,
                    seq_before = ?marker.seq_before,
                    seq_after = ?marker.seq_after,
                    "Sequence gap"
                );
                emit_gap(marker, channels, health).await;
            }
            if forward {
                let _ = channels.books.send(snapshot).await;
            }
        }
        VenueEvent::Ticker(update) => {
            record_message(health, None);
            let instrument = update.instrument.clone();
            let assembly = assemblies.entry(instrument.clone()).or_default();
            assembly.merge(&update);
            if let Some(snapshot) = assembly.snapshot(venue, instrument, received_at) {
                let _ = channels.tickers.send(snapshot).await;
            }
        }
    }
}

fn record_message(health: &Arc<RwLock<HealthState>>, lag_ms: Option<i64>) {
    let mut h = health.write();
    h.message_count += 1;
    h.last_message_at = Some(Utc::now());
    if let Some(lag) = lag_ms {
        h.lag_ms = lag;
    }
}

async fn emit_gap(
    marker: GapMarker,
    channels: &AdapterChannels,
    health: &Arc<RwLock<HealthState>>,
) {
    health.write().record_gap(marker.ended_at);
    let _ = channels.gaps.send(marker).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vigil_core::{BookLevel, SnapshotSource};

    fn book(seq: u64, received_at: DateTime<Utc>) -> OrderBookSnapshot {
        OrderBookSnapshot {
            venue: VenueId::Binance,
            instrument: InstrumentId::new("BTC-USDT"),
            venue_time: received_at,
            received_at,
            sequence_id: seq,
            bids: vec![BookLevel::new(Px::new(dec!(100)), Qty::new(dec!(1)))],
            asks: vec![BookLevel::new(Px::new(dec!(101)), Qty::new(dec!(1)))],
            depth_levels: 20,
            source: SnapshotSource::Stream,
        }
    }

    #[test]
    fn test_gate_forward_jump_no_gap() {
        let now = Utc::now();
        let mut gate = StreamGate::new(InstrumentId::new("BTC-USDT"), now);

        let (gap, forward) = gate.observe_book(VenueId::Binance, &book(100, now));
        assert!(gap.is_none());
        assert!(forward);

        let (gap, forward) = gate.observe_book(VenueId::Binance, &book(5000, now));
        assert!(gap.is_none());
        assert!(forward);
    }

    #[test]
    fn test_gate_duplicate_marked_and_dropped() {
        let now = Utc::now();
        let mut gate = StreamGate::new(InstrumentId::new("BTC-USDT"), now);

        gate.observe_book(VenueId::Binance, &book(100, now));
        let (gap, forward) = gate.observe_book(VenueId::Binance, &book(100, now));

        let gap = gap.unwrap();
        assert_eq!(gap.reason, GapReason::Duplicate);
        assert_eq!(gap.seq_before, Some(100));
        assert_eq!(gap.seq_after, Some(100));
        assert!(!forward);
    }

    #[test]
    fn test_gate_regression_marked_and_forwarded() {
        let now = Utc::now();
        let mut gate = StreamGate::new(InstrumentId::new("BTC-USDT"), now);

        gate.observe_book(VenueId::Binance, &book(100, now));
        let (gap, forward) = gate.observe_book(VenueId::Binance, &book(90, now));

        let gap = gap.unwrap();
        assert_eq!(gap.reason, GapReason::SequenceRegression);
        assert_eq!(gap.seq_before, Some(100));
        assert_eq!(gap.seq_after, Some(90));
        assert!(forward);
    }

    #[test]
    fn test_gate_silence_threshold() {
        let start = Utc::now();
        let mut gate = StreamGate::new(InstrumentId::new("BTC-USDT"), start);

        // Under threshold: no gap.
        let t1 = start + ChronoDuration::seconds(3);
        assert!(gate.check_silence(VenueId::Binance, t1, 5_000).is_none());

        // Over threshold: one gap, clock rebased.
        let t2 = start + ChronoDuration::seconds(6);
        let gap = gate.check_silence(VenueId::Binance, t2, 5_000).unwrap();
        assert_eq!(gap.reason, GapReason::Timeout);
        assert_eq!(gap.started_at, start);
        assert_eq!(gap.ended_at, t2);

        // Immediately after: silence clock was rebased, no second gap.
        let t3 = t2 + ChronoDuration::seconds(1);
        assert!(gate.check_silence(VenueId::Binance, t3, 5_000).is_none());
    }

    #[test]
    fn test_gate_reconnect_gap_and_seq_reset() {
        let start = Utc::now();
        let mut gate = StreamGate::new(InstrumentId::new("BTC-USDT"), start);
        gate.observe_book(VenueId::Binance, &book(100, start));

        let resumed = start + ChronoDuration::seconds(30);
        let gap = gate.on_reconnect(VenueId::Binance, resumed);
        assert_eq!(gap.reason, GapReason::Disconnect);
        assert_eq!(gap.seq_before, Some(100));
        assert!(gap.seq_after.is_none());

        // A lower sequence after reconnect is not a regression.
        let (gap, forward) = gate.observe_book(VenueId::Binance, &book(5, resumed));
        assert!(gap.is_none());
        assert!(forward);
    }

    #[test]
    fn test_ticker_assembly_join() {
        let instrument = InstrumentId::new("BTC-USDT-PERP");
        let now = Utc::now();
        let mut assembly = TickerAssembly::default();

        // Mark price alone is not enough for a snapshot.
        let mut mark = TickerUpdate::empty(instrument.clone(), now);
        mark.mark_price = Some(Px::new(dec!(50100)));
        assembly.merge(&mark);
        assert!(assembly
            .snapshot(VenueId::Okx, instrument.clone(), now)
            .is_none());

        // Last price + volume completes it, carrying the joined mark.
        let mut last = TickerUpdate::empty(instrument.clone(), now);
        last.last_price = Some(Px::new(dec!(50000)));
        last.volume_24h = Some(Qty::new(dec!(1234)));
        assembly.merge(&last);

        let snapshot = assembly
            .snapshot(VenueId::Okx, instrument, now)
            .expect("complete after last price");
        assert_eq!(snapshot.last_price.inner(), dec!(50000));
        assert_eq!(snapshot.mark_price.unwrap().inner(), dec!(50100));
        assert!(snapshot.index_price.is_none());
    }

    #[test]
    fn test_health_gap_window_pruning() {
        let mut health = HealthState::new();
        let now = Utc::now();

        health.record_gap(now - ChronoDuration::minutes(90));
        health.record_gap(now - ChronoDuration::minutes(30));
        health.record_gap(now);

        // The 90-minute-old gap fell out of the rolling hour.
        assert_eq!(health.snapshot(VenueId::Binance).gaps_last_hour, 2);
    }
}
