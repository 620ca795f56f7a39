//! Binance wire protocol.
//!
//! Subscriptions are composed into the combined-stream URL
//! (`/stream?streams=btcusdt@depth20@100ms/btcusdt@ticker/...`), so no
//! subscribe message is sent after connect. Keep-alive uses WebSocket
//! ping/pong control frames; the server pings periodically and we answer
//! at the transport layer.

use crate::config::VenueConfig;
use crate::error::{VenueError, VenueResult};
use crate::protocol::{parse_levels, ts_from_millis, TickerUpdate, VenueEvent, VenueParser};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::Message;
use vigil_core::{InstrumentId, OrderBookSnapshot, SnapshotSource, VenueId};
use vigil_ws::{KeepAlive, WireProtocol};

/// Combined-stream envelope: `{"stream":"btcusdt@ticker","data":{...}}`.
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    stream: String,
    data: serde_json::Value,
}

/// Partial book depth payload.
#[derive(Debug, Deserialize)]
struct DepthPayload {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

/// 24h rolling ticker payload (`@ticker`).
#[derive(Debug, Deserialize)]
struct TickerPayload {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "v")]
    volume: String,
}

/// Mark-price payload (`@markPrice`, perpetuals).
#[derive(Debug, Deserialize)]
struct MarkPricePayload {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "p")]
    mark_price: String,
    #[serde(rename = "i")]
    index_price: String,
    #[serde(rename = "r")]
    funding_rate: String,
    #[serde(rename = "T")]
    next_funding_time: i64,
}

/// Binance protocol: URL composition, frame keep-alive, payload decoding.
pub struct BinanceProtocol {
    config: VenueConfig,
    /// Lowercased venue symbol -> normalized instrument + depth.
    by_symbol: HashMap<String, (InstrumentId, usize)>,
}

impl BinanceProtocol {
    pub fn new(config: VenueConfig) -> Self {
        let by_symbol = config
            .instruments
            .iter()
            .map(|spec| {
                (
                    spec.venue_symbol.to_lowercase(),
                    (spec.id.clone(), spec.depth_levels),
                )
            })
            .collect();
        Self { config, by_symbol }
    }

    fn instrument(&self, symbol: &str) -> VenueResult<&(InstrumentId, usize)> {
        self.by_symbol
            .get(symbol)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }

    fn parse_book(
        &self,
        symbol: &str,
        data: serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> VenueResult<VenueEvent> {
        let payload: DepthPayload = serde_json::from_value(data)?;
        let (instrument, depth_levels) = self.instrument(symbol)?.clone();

        let snapshot = OrderBookSnapshot {
            venue: VenueId::Binance,
            instrument,
            // Partial depth frames carry no event time.
            venue_time: received_at,
            received_at,
            sequence_id: payload.last_update_id,
            bids: parse_levels(&payload.bids)?,
            asks: parse_levels(&payload.asks)?,
            depth_levels,
            source: SnapshotSource::Stream,
        };
        snapshot.validate()?;
        Ok(VenueEvent::Book(snapshot))
    }

    fn parse_ticker(
        &self,
        symbol: &str,
        data: serde_json::Value,
    ) -> VenueResult<VenueEvent> {
        let payload: TickerPayload = serde_json::from_value(data)?;
        let (instrument, _) = self.instrument(symbol)?.clone();

        let mut update = TickerUpdate::empty(instrument, ts_from_millis(payload.event_time));
        update.last_price = Some(payload.last_price.parse()?);
        update.volume_24h = Some(payload.volume.parse()?);
        Ok(VenueEvent::Ticker(update))
    }

    fn parse_mark_price(
        &self,
        symbol: &str,
        data: serde_json::Value,
    ) -> VenueResult<VenueEvent> {
        let payload: MarkPricePayload = serde_json::from_value(data)?;
        let (instrument, _) = self.instrument(symbol)?.clone();

        let mut update = TickerUpdate::empty(instrument, ts_from_millis(payload.event_time));
        update.mark_price = Some(payload.mark_price.parse()?);
        update.index_price = Some(payload.index_price.parse()?);
        update.funding_rate = Some(payload.funding_rate.parse()?);
        update.next_funding_at = Some(ts_from_millis(payload.next_funding_time));
        Ok(VenueEvent::Ticker(update))
    }
}

impl WireProtocol for BinanceProtocol {
    fn endpoint(&self) -> String {
        let streams: Vec<String> = self
            .config
            .instruments
            .iter()
            .flat_map(|spec| {
                let symbol = spec.venue_symbol.to_lowercase();
                spec.streams
                    .iter()
                    .map(move |stream| format!("{symbol}@{stream}"))
            })
            .collect();
        format!("{}/stream?streams={}", self.config.ws_url, streams.join("/"))
    }

    fn subscribe_messages(&self) -> Vec<Message> {
        // Subscriptions are in the URL.
        Vec::new()
    }

    fn keep_alive(&self) -> KeepAlive {
        KeepAlive::PingFrames {
            interval_ms: self.config.ping_interval_ms,
            timeout_ms: self.config.pong_timeout_ms,
        }
    }
}

impl VenueParser for BinanceProtocol {
    fn venue(&self) -> VenueId {
        VenueId::Binance
    }

    fn parse(&self, text: &str, received_at: DateTime<Utc>) -> VenueResult<Vec<VenueEvent>> {
        let envelope: StreamEnvelope = serde_json::from_str(text)?;

        // Stream name is "{symbol}@{kind}" with possible suffixes
        // ("btcusdt@depth20@100ms").
        let mut parts = envelope.stream.splitn(2, '@');
        let symbol = parts
            .next()
            .ok_or_else(|| VenueError::MalformedFrame(envelope.stream.clone()))?;
        let kind = parts
            .next()
            .ok_or_else(|| VenueError::MalformedFrame(envelope.stream.clone()))?;

        let event = if kind.starts_with("depth") {
            self.parse_book(symbol, envelope.data, received_at)?
        } else if kind.starts_with("markPrice") {
            self.parse_mark_price(symbol, envelope.data)?
        } else if kind.starts_with("ticker") {
            self.parse_ticker(symbol, envelope.data)?
        } else {
            return Err(VenueError::MalformedFrame(format!(
                "unexpected stream kind: {kind}"
            )));
        };

        Ok(vec![event])
    }
}
