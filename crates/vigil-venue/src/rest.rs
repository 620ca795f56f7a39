//! REST fallback polling.
//!
//! While an adapter is degraded it polls the venue's depth endpoint at the
//! configured cadence. Polled snapshots use the same schema as streamed
//! ones but are flagged `SnapshotSource::RestPoll` so downstream excludes
//! them from latency measurements.

use crate::config::{InstrumentSpec, VenueConfig};
use crate::error::{VenueError, VenueResult};
use crate::protocol::{parse_levels, ts_from_millis};
use chrono::Utc;
use serde::Deserialize;
use vigil_core::{OrderBookSnapshot, SnapshotSource, VenueId};

#[derive(Debug, Deserialize)]
struct BinanceDepthResponse {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OkxBooksResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<OkxBookData>,
}

#[derive(Debug, Deserialize)]
struct OkxBookData {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
    ts: String,
}

/// Fetch one order-book snapshot over REST.
pub async fn fetch_book(
    client: &reqwest::Client,
    config: &VenueConfig,
    spec: &InstrumentSpec,
) -> VenueResult<OrderBookSnapshot> {
    let snapshot = match config.venue {
        VenueId::Binance => fetch_binance(client, config, spec).await?,
        VenueId::Okx => fetch_okx(client, config, spec).await?,
    };
    snapshot.validate()?;
    Ok(snapshot)
}

async fn fetch_binance(
    client: &reqwest::Client,
    config: &VenueConfig,
    spec: &InstrumentSpec,
) -> VenueResult<OrderBookSnapshot> {
    let url = format!(
        "{}/api/v3/depth?symbol={}&limit={}",
        config.rest_url, spec.venue_symbol, spec.depth_levels
    );
    let response: BinanceDepthResponse = client.get(&url).send().await?.json().await?;

    let now = Utc::now();
    Ok(OrderBookSnapshot {
        venue: VenueId::Binance,
        instrument: spec.id.clone(),
        venue_time: now,
        received_at: now,
        sequence_id: response.last_update_id,
        bids: parse_levels(&response.bids)?,
        asks: parse_levels(&response.asks)?,
        depth_levels: spec.depth_levels,
        source: SnapshotSource::RestPoll,
    })
}

async fn fetch_okx(
    client: &reqwest::Client,
    config: &VenueConfig,
    spec: &InstrumentSpec,
) -> VenueResult<OrderBookSnapshot> {
    let url = format!(
        "{}/api/v5/market/books?instId={}&sz={}",
        config.rest_url, spec.venue_symbol, spec.depth_levels
    );
    let response: OkxBooksResponse = client.get(&url).send().await?.json().await?;

    if response.code != "0" {
        return Err(VenueError::VenueReported(format!(
            "okx books {}: {}",
            response.code, response.msg
        )));
    }
    let book = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| VenueError::MalformedFrame("empty books response".to_string()))?;

    let ts_ms: i64 = book
        .ts
        .parse()
        .map_err(|_| VenueError::MalformedFrame(format!("bad timestamp: {}", book.ts)))?;

    Ok(OrderBookSnapshot {
        venue: VenueId::Okx,
        instrument: spec.id.clone(),
        venue_time: ts_from_millis(ts_ms),
        received_at: Utc::now(),
        // OKX REST books carry no sequence id; the venue timestamp stands
        // in so unchanged polls are recognizable.
        sequence_id: ts_ms as u64,
        bids: parse_levels(&book.bids)?,
        asks: parse_levels(&book.asks)?,
        depth_levels: spec.depth_levels,
        source: SnapshotSource::RestPoll,
    })
}
