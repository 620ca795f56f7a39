//! Error types for vigil-ws.

use thiserror::Error;

/// WebSocket transport errors.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed by server: code={code} reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Keep-alive timeout: no pong within budget")]
    HeartbeatTimeout,

    #[error("WebSocket protocol error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for transport operations.
pub type WsResult<T> = std::result::Result<T, WsError>;
