//! Per-venue health projection.

use crate::venue::VenueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection health status of one venue adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueStatus {
    Connected,
    /// Streaming failed past the retry budget; serving REST polls.
    Degraded,
    Reconnecting,
    Disconnected,
}

impl VenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for VenueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one venue's adapter health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub venue: VenueId,
    pub status: VenueStatus,
    pub last_message_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    /// Receive-path lag of the most recent streamed message.
    pub lag_ms: i64,
    pub reconnect_count: u32,
    pub gaps_last_hour: u32,
}

impl HealthSnapshot {
    pub fn disconnected(venue: VenueId) -> Self {
        Self {
            venue,
            status: VenueStatus::Disconnected,
            last_message_at: None,
            message_count: 0,
            lag_ms: 0,
            reconnect_count: 0,
            gaps_last_hour: 0,
        }
    }
}
