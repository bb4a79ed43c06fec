//! Transport event stream

use serde_json::Value;

/// Everything the transport tells its listeners, as one tagged union on a
/// broadcast channel instead of per-event callbacks.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Worker-initiated notification (method, no id)
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// Worker exited; all pending requests were rejected
    Disconnected { status: Option<i32> },
    /// A reconnection attempt succeeded and the handshake completed
    Reconnected,
    /// The reconnection budget is used up; no further automatic attempts
    ReconnectExhausted,
}
