//! WebSocket transport framework for venue connections.
//!
//! Connection lifecycle, reconnection with exponential backoff, and
//! venue-pluggable keep-alive. Wire parsing lives with the venue adapters;
//! this crate only moves frames.

pub mod backoff;
pub mod connection;
pub mod error;
pub mod heartbeat;

pub use backoff::BackoffPolicy;
pub use connection::{
    ConnEvent, ConnectionConfig, ConnectionManager, ConnectionState, KeepAlive, TextClass,
    WireProtocol,
};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatManager;

/// Initialize the rustls crypto provider. Must run before the first
/// connection is opened.
pub fn init_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
