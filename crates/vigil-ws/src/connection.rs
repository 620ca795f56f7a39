//! Venue connection lifecycle.
//!
//! `ConnectionManager` drives one socket through the state machine
//! `Init -> Connecting -> Connected -> Subscribed -> Streaming`, falling
//! back to `Reconnecting` with exponential backoff on any failure and to
//! `Degraded` once the attempt budget is spent (the owner switches to REST
//! polling while reconnection continues in the background).
//!
//! The wire protocol (endpoint, subscription handshake, keep-alive shape,
//! pong detection) is pluggable so one loop serves every venue.

use crate::backoff::BackoffPolicy;
use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Venue-specific keep-alive shape.
///
/// Binance answers WebSocket ping/pong control frames; OKX expects the
/// literal text message `"ping"` and answers with the text `"pong"`.
/// Mishandling either causes a spurious reconnect every ping interval, so
/// both code paths are explicit and separately tested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAlive {
    /// WebSocket ping/pong control frames.
    PingFrames { interval_ms: u64, timeout_ms: u64 },
    /// Application-level text ping with an expected text pong.
    TextPing {
        ping: String,
        pong: String,
        interval_ms: u64,
        timeout_ms: u64,
    },
}

impl KeepAlive {
    pub fn interval_ms(&self) -> u64 {
        match self {
            Self::PingFrames { interval_ms, .. } | Self::TextPing { interval_ms, .. } => {
                *interval_ms
            }
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            Self::PingFrames { timeout_ms, .. } | Self::TextPing { timeout_ms, .. } => *timeout_ms,
        }
    }

    /// The outgoing ping message.
    pub fn ping_message(&self) -> Message {
        match self {
            Self::PingFrames { .. } => Message::Ping(Vec::new()),
            Self::TextPing { ping, .. } => Message::Text(ping.clone()),
        }
    }

    /// Whether a text payload is this venue's pong.
    pub fn is_text_pong(&self, text: &str) -> bool {
        match self {
            Self::PingFrames { .. } => false,
            Self::TextPing { pong, .. } => text == pong,
        }
    }
}

/// Classification of an incoming text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextClass {
    /// Keep-alive response; consumed by the transport.
    Pong,
    /// Data payload; forwarded to the owner.
    Data,
    /// Venue-reported error (subscription rejection, rate limit). Treated
    /// as a connection failure so it escalates through the same backoff
    /// budget as I/O errors.
    VenueError(String),
}

/// Venue wire protocol hooks consumed by [`ConnectionManager`].
pub trait WireProtocol: Send + Sync + 'static {
    /// WebSocket endpoint, including any stream composition in the URL.
    fn endpoint(&self) -> String;

    /// Messages to send right after connect to establish subscriptions.
    /// Empty when subscriptions are composed into the endpoint URL.
    fn subscribe_messages(&self) -> Vec<Message>;

    /// Keep-alive shape for this venue.
    fn keep_alive(&self) -> KeepAlive;

    /// Distinguish keep-alive pongs from data payloads.
    fn classify_text(&self, text: &str) -> TextClass {
        if self.keep_alive().is_text_pong(text) {
            TextClass::Pong
        } else {
            TextClass::Data
        }
    }
}

impl<P: WireProtocol> WireProtocol for Arc<P> {
    fn endpoint(&self) -> String {
        (**self).endpoint()
    }

    fn subscribe_messages(&self) -> Vec<Message> {
        (**self).subscribe_messages()
    }

    fn keep_alive(&self) -> KeepAlive {
        (**self).keep_alive()
    }

    fn classify_text(&self, text: &str) -> TextClass {
        (**self).classify_text(text)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    Connected,
    Subscribed,
    Streaming,
    Reconnecting,
    /// Attempt budget spent; owner should poll REST while we keep retrying.
    Degraded,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Degraded => "degraded",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the connection loop.
#[derive(Debug, Clone)]
pub enum ConnEvent {
    StateChanged(ConnectionState),
    /// A data frame with its local receive timestamp.
    Frame {
        text: String,
        received_at: DateTime<Utc>,
    },
}

/// Connection configuration.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub backoff: BackoffPolicy,
}

/// Drives one venue socket for its whole lifetime.
pub struct ConnectionManager<P: WireProtocol> {
    protocol: P,
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: HeartbeatManager,
    events_tx: mpsc::Sender<ConnEvent>,
    reconnect_count: Arc<RwLock<u32>>,
}

impl<P: WireProtocol> ConnectionManager<P> {
    pub fn new(protocol: P, config: ConnectionConfig, events_tx: mpsc::Sender<ConnEvent>) -> Self {
        let keep_alive = protocol.keep_alive();
        Self {
            protocol,
            config,
            state: Arc::new(RwLock::new(ConnectionState::Init)),
            heartbeat: HeartbeatManager::new(keep_alive.interval_ms(), keep_alive.timeout_ms()),
            events_tx,
            reconnect_count: Arc::new(RwLock::new(0)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        // A dropped receiver means the adapter is shutting down; the main
        // loop notices via the cancellation token.
        let _ = self.events_tx.send(ConnEvent::StateChanged(state)).await;
    }

    /// Run until cancelled. Reconnects forever; after the attempt budget is
    /// spent the state is `Degraded` but retries continue at the capped
    /// delay.
    pub async fn run(&self, cancel: CancellationToken) -> WsResult<()> {
        let mut attempt = 0u32;
        let mut degraded = false;

        loop {
            if cancel.is_cancelled() {
                self.set_state(ConnectionState::Disconnected).await;
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting).await;

            match self.drive(&cancel, &mut attempt, &mut degraded).await {
                Ok(()) => {
                    // Cancelled mid-stream.
                    self.set_state(ConnectionState::Disconnected).await;
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Venue connection error");
                }
            }

            attempt += 1;
            *self.reconnect_count.write() += 1;

            if self.config.backoff.exhausted(attempt) && !degraded {
                degraded = true;
                warn!(attempt, "Reconnect budget spent, entering degraded mode");
                self.set_state(ConnectionState::Degraded).await;
            } else if !degraded {
                self.set_state(ConnectionState::Reconnecting).await;
            }

            let delay = self.config.backoff.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(ConnectionState::Disconnected).await;
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One connection attempt: connect, subscribe, stream until error or
    /// cancellation. `Ok(())` means cancelled.
    async fn drive(
        &self,
        cancel: &CancellationToken,
        attempt: &mut u32,
        degraded: &mut bool,
    ) -> WsResult<()> {
        let url = self.protocol.endpoint();
        info!(url = %url, "Connecting to venue");

        let (ws_stream, _response) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Connected).await;

        for msg in self.protocol.subscribe_messages() {
            write.send(msg).await?;
        }
        self.set_state(ConnectionState::Subscribed).await;

        self.heartbeat.reset();
        let keep_alive = self.protocol.keep_alive();
        let mut streaming = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_message();
                            match self.protocol.classify_text(&text) {
                                TextClass::Pong => {
                                    self.heartbeat.record_pong();
                                }
                                TextClass::VenueError(msg) => {
                                    error!(%msg, "Venue-reported error");
                                    return Err(WsError::ConnectionFailed(msg));
                                }
                                TextClass::Data => {
                                    if !streaming {
                                        streaming = true;
                                        // Successful stream resets the retry budget.
                                        *attempt = 0;
                                        *degraded = false;
                                        self.set_state(ConnectionState::Streaming).await;
                                    }
                                    let event = ConnEvent::Frame {
                                        text,
                                        received_at: Utc::now(),
                                    };
                                    if self.events_tx.send(event).await.is_err() {
                                        warn!("Frame receiver dropped, closing connection");
                                        return Ok(());
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            warn!(code, %reason, "Connection closed by venue");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("stream ended".to_string()));
                        }
                        _ => {}
                    }
                }

                _ = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_ping() {
                        write.send(keep_alive.ping_message()).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent keep-alive ping");
                    }
                }
            }
        }
    }
}
