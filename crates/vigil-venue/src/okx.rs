//! OKX wire protocol.
//!
//! Subscriptions are sent as a JSON `{"op":"subscribe","args":[...]}`
//! message after connect. Keep-alive is the application-level text
//! `"ping"` answered by the literal text `"pong"` — not a WebSocket pong
//! frame. Venue-reported `{"event":"error",...}` messages escalate through
//! the reconnect backoff budget.

use crate::config::VenueConfig;
use crate::error::{VenueError, VenueResult};
use crate::protocol::{parse_levels, ts_from_millis, TickerUpdate, VenueEvent, VenueParser};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::Message;
use vigil_core::{InstrumentId, OrderBookSnapshot, SnapshotSource, VenueId};
use vigil_ws::{KeepAlive, TextClass, WireProtocol};

/// Channel message envelope:
/// `{"arg":{"channel":"books5","instId":"BTC-USDT-SWAP"},"data":[...]}`.
#[derive(Debug, Deserialize)]
struct ChannelEnvelope {
    arg: ChannelArg,
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChannelArg {
    channel: String,
    #[serde(rename = "instId")]
    inst_id: String,
}

/// Control-plane envelope: subscription acks and errors.
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    event: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookPayload {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
    ts: String,
    #[serde(rename = "seqId")]
    seq_id: u64,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    last: String,
    #[serde(rename = "vol24h")]
    vol_24h: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct MarkPricePayload {
    #[serde(rename = "markPx")]
    mark_px: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct IndexTickerPayload {
    #[serde(rename = "idxPx")]
    idx_px: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct FundingRatePayload {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "fundingTime")]
    funding_time: String,
}

fn ts_from_str(ts: &str) -> VenueResult<DateTime<Utc>> {
    let ms: i64 = ts
        .parse()
        .map_err(|_| VenueError::MalformedFrame(format!("bad timestamp: {ts}")))?;
    Ok(ts_from_millis(ms))
}

/// OKX protocol: JSON subscribe handshake, text keep-alive, payload
/// decoding for books5 / tickers / mark-price / index-tickers /
/// funding-rate channels.
pub struct OkxProtocol {
    config: VenueConfig,
    by_symbol: HashMap<String, (InstrumentId, usize)>,
}

impl OkxProtocol {
    pub fn new(config: VenueConfig) -> Self {
        let by_symbol = config
            .instruments
            .iter()
            .map(|spec| {
                (
                    spec.venue_symbol.clone(),
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
        let payload: BookPayload = serde_json::from_value(data)?;
        let (instrument, depth_levels) = self.instrument(symbol)?.clone();

        let snapshot = OrderBookSnapshot {
            venue: VenueId::Okx,
            instrument,
            venue_time: ts_from_str(&payload.ts)?,
            received_at,
            sequence_id: payload.seq_id,
            bids: parse_levels(&payload.bids)?,
            asks: parse_levels(&payload.asks)?,
            depth_levels,
            source: SnapshotSource::Stream,
        };
        snapshot.validate()?;
        Ok(VenueEvent::Book(snapshot))
    }

    fn parse_channel_data(
        &self,
        channel: &str,
        symbol: &str,
        data: serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> VenueResult<VenueEvent> {
        match channel {
            c if c.starts_with("books") => self.parse_book(symbol, data, received_at),
            "tickers" => {
                let payload: TickerPayload = serde_json::from_value(data)?;
                let (instrument, _) = self.instrument(symbol)?.clone();
                let mut update = TickerUpdate::empty(instrument, ts_from_str(&payload.ts)?);
                update.last_price = Some(payload.last.parse()?);
                update.volume_24h = Some(payload.vol_24h.parse()?);
                Ok(VenueEvent::Ticker(update))
            }
            "mark-price" => {
                let payload: MarkPricePayload = serde_json::from_value(data)?;
                let (instrument, _) = self.instrument(symbol)?.clone();
                let mut update = TickerUpdate::empty(instrument, ts_from_str(&payload.ts)?);
                update.mark_price = Some(payload.mark_px.parse()?);
                Ok(VenueEvent::Ticker(update))
            }
            "index-tickers" => {
                let payload: IndexTickerPayload = serde_json::from_value(data)?;
                let (instrument, _) = self.instrument(symbol)?.clone();
                let mut update = TickerUpdate::empty(instrument, ts_from_str(&payload.ts)?);
                update.index_price = Some(payload.idx_px.parse()?);
                Ok(VenueEvent::Ticker(update))
            }
            "funding-rate" => {
                let payload: FundingRatePayload = serde_json::from_value(data)?;
                let (instrument, _) = self.instrument(symbol)?.clone();
                let mut update =
                    TickerUpdate::empty(instrument, ts_from_str(&payload.funding_time)?);
                update.funding_rate = Some(payload.funding_rate.parse()?);
                update.next_funding_at = Some(ts_from_str(&payload.funding_time)?);
                Ok(VenueEvent::Ticker(update))
            }
            other => Err(VenueError::MalformedFrame(format!(
                "unexpected channel: {other}"
            ))),
        }
    }
}

impl WireProtocol for OkxProtocol {
    fn endpoint(&self) -> String {
        self.config.ws_url.clone()
    }

    fn subscribe_messages(&self) -> Vec<Message> {
        let args: Vec<serde_json::Value> = self
            .config
            .instruments
            .iter()
            .flat_map(|spec| {
                let symbol = spec.venue_symbol.clone();
                spec.streams.iter().map(move |channel| {
                    serde_json::json!({
                        "channel": channel,
                        "instId": symbol,
                    })
                })
            })
            .collect();

        let subscribe = serde_json::json!({
            "op": "subscribe",
            "args": args,
        });
        vec![Message::Text(subscribe.to_string())]
    }

    fn keep_alive(&self) -> KeepAlive {
        KeepAlive::TextPing {
            ping: "ping".to_string(),
            pong: "pong".to_string(),
            interval_ms: self.config.ping_interval_ms,
            timeout_ms: self.config.pong_timeout_ms,
        }
    }

    fn classify_text(&self, text: &str) -> TextClass {
        if text == "pong" {
            return TextClass::Pong;
        }
        // Control-plane events: {"event":"subscribe"|"error",...}
        if text.contains("\"event\"") {
            if let Ok(event) = serde_json::from_str::<EventEnvelope>(text) {
                if event.event == "error" {
                    let code = event.code.unwrap_or_default();
                    let msg = event.msg.unwrap_or_default();
                    return TextClass::VenueError(format!("okx error {code}: {msg}"));
                }
            }
        }
        TextClass::Data
    }
}

impl VenueParser for OkxProtocol {
    fn venue(&self) -> VenueId {
        VenueId::Okx
    }

    fn parse(&self, text: &str, received_at: DateTime<Utc>) -> VenueResult<Vec<VenueEvent>> {
        // Subscription acks have an "event" field and no data; skip them.
        if text.contains("\"event\"") && serde_json::from_str::<EventEnvelope>(text).is_ok() {
            return Ok(Vec::new());
        }

        let envelope: ChannelEnvelope = serde_json::from_str(text)?;
        let mut events = Vec::with_capacity(envelope.data.len());
        for entry in envelope.data {
            events.push(self.parse_channel_data(
                &envelope.arg.channel,
                &envelope.arg.inst_id,
                entry,
                received_at,
            )?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentSpec;
    use rust_decimal_macros::dec;

    fn test_protocol() -> OkxProtocol {
        OkxProtocol::new(VenueConfig {
            venue: VenueId::Okx,
            ws_url: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
            rest_url: "https://www.okx.com".to_string(),
            backoff: Default::default(),
            ping_interval_ms: 25_000,
            pong_timeout_ms: 10_000,
            silence_gap_ms: 5_000,
            rest_poll_interval_ms: 1_000,
            instruments: vec![InstrumentSpec {
                id: InstrumentId::new("BTC-USDT-PERP"),
                venue_symbol: "BTC-USDT-SWAP".to_string(),
                streams: vec!["books5".to_string(), "tickers".to_string()],
                depth_levels: 5,
            }],
        })
    }

    #[test]
    fn test_subscribe_message_shape() {
        let protocol = test_protocol();
        let messages = protocol.subscribe_messages();
        assert_eq!(messages.len(), 1);

        let Message::Text(text) = &messages[0] else {
            panic!("expected text message");
        };
        let value: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["args"][0]["channel"], "books5");
        assert_eq!(value["args"][0]["instId"], "BTC-USDT-SWAP");
        assert_eq!(value["args"][1]["channel"], "tickers");
    }

    #[test]
    fn test_text_pong_classification() {
        let protocol = test_protocol();
        assert_eq!(protocol.classify_text("pong"), TextClass::Pong);
        assert_eq!(
            protocol.classify_text("{\"arg\":{},\"data\":[]}"),
            TextClass::Data
        );
    }

    #[test]
    fn test_error_event_classification() {
        let protocol = test_protocol();
        let class = protocol
            .classify_text(r#"{"event":"error","code":"60012","msg":"Invalid request"}"#);
        assert!(matches!(class, TextClass::VenueError(_)));

        // Subscription acks are not errors.
        let class = protocol.classify_text(r#"{"event":"subscribe","arg":{"channel":"books5"}}"#);
        assert_eq!(class, TextClass::Data);
    }

    #[test]
    fn test_subscribe_ack_parses_to_no_events() {
        let protocol = test_protocol();
        let events = protocol
            .parse(
                r#"{"event":"subscribe","arg":{"channel":"books5","instId":"BTC-USDT-SWAP"}}"#,
                Utc::now(),
            )
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_book_frame() {
        let protocol = test_protocol();
        let frame = r#"{
            "arg": {"channel": "books5", "instId": "BTC-USDT-SWAP"},
            "data": [{
                "asks": [["41006.8", "0.60", "0", "1"], ["41007.0", "1.2", "0", "2"]],
                "bids": [["41006.3", "0.30", "0", "1"], ["41006.0", "2.0", "0", "4"]],
                "ts": "1629966436396",
                "seqId": 123456789
            }]
        }"#;

        let events = protocol.parse(frame, Utc::now()).unwrap();
        assert_eq!(events.len(), 1);
        let VenueEvent::Book(book) = &events[0] else {
            panic!("expected book event");
        };
        assert_eq!(book.venue, VenueId::Okx);
        assert_eq!(book.instrument.as_str(), "BTC-USDT-PERP");
        assert_eq!(book.sequence_id, 123456789);
        assert_eq!(book.best_bid().unwrap().price.inner(), dec!(41006.3));
        // OKX levels carry two extra fields; only price and size are used.
        assert_eq!(book.best_ask().unwrap().qty.inner(), dec!(0.60));
    }

    #[test]
    fn test_parse_mark_and_index_frames() {
        let protocol = test_protocol();

        let mark = r#"{
            "arg": {"channel": "mark-price", "instId": "BTC-USDT-SWAP"},
            "data": [{"markPx": "41020.5", "ts": "1629966436396"}]
        }"#;
        let events = protocol.parse(mark, Utc::now()).unwrap();
        let VenueEvent::Ticker(update) = &events[0] else {
            panic!("expected ticker event");
        };
        assert_eq!(update.mark_price.unwrap().inner(), dec!(41020.5));

        let index = r#"{
            "arg": {"channel": "index-tickers", "instId": "BTC-USDT-SWAP"},
            "data": [{"idxPx": "41010.1", "ts": "1629966436396"}]
        }"#;
        let events = protocol.parse(index, Utc::now()).unwrap();
        let VenueEvent::Ticker(update) = &events[0] else {
            panic!("expected ticker event");
        };
        assert_eq!(update.index_price.unwrap().inner(), dec!(41010.1));
    }

    #[test]
    fn test_bad_timestamp_dropped() {
        let protocol = test_protocol();
        let frame = r#"{
            "arg": {"channel": "tickers", "instId": "BTC-USDT-SWAP"},
            "data": [{"last": "41000", "vol24h": "1000", "ts": "yesterday"}]
        }"#;
        assert!(protocol.parse(frame, Utc::now()).is_err());
    }
}
