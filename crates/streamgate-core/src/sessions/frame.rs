//! Wire framing for the push-event stream

use serde_json::Value;

/// First event on every stream
pub const CONNECTED_EVENT: &str = "connected";

/// Sent best-effort just before a session is closed for exceeding its
/// lifetime
pub const SESSION_EXPIRED_EVENT: &str = "session-expired";

/// `event: <name>\ndata: <json>\n\n`
pub fn event_frame(event: &str, payload: &Value) -> String {
    format!("event: {event}\ndata: {payload}\n\n")
}

/// `:heartbeat <epoch-ms>\n\n`, a comment line clients ignore
pub fn heartbeat_frame(epoch_ms: i64) -> String {
    format!(":heartbeat {epoch_ms}\n\n")
}

/// Event names end up on a single frame line, so they must be non-empty
/// and free of line breaks.
pub fn is_valid_event_name(event: &str) -> bool {
    !event.is_empty() && !event.contains(['\r', '\n'])
}
