//! Abstract notification dispatch.
//!
//! The detector knows channel identifiers ("console", "slack", ...) but no
//! transports. Implementations enqueue or forward; they must not block the
//! detector task.

use tracing::info;
use vigil_core::Alert;

/// Outbound notification sink.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, alert: &Alert, channels: &[String]);
}

/// Dispatcher that records notifications in the structured log. Used as
/// the default sink and wherever no transport is wired.
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn dispatch(&self, alert: &Alert, channels: &[String]) {
        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            priority = %alert.priority,
            venue = %alert.venue,
            instrument = %alert.instrument,
            channels = ?channels,
            "Alert notification"
        );
    }
}
