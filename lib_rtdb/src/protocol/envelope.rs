//! Outbound frame builders.
//!
//! Every message the server sends is built here so the wire shapes live in
//! one place.

use serde_json::{json, Value};

/// Protocol version announced in the handshake.
pub const PROTOCOL_VERSION: &str = "5";

/// Request outcome codes carried in `b.s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    PermissionDenied,
    InvalidToken,
    DataStale,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::PermissionDenied => "permission_denied",
            Status::InvalidToken => "invalid_token",
            Status::DataStale => "datastale",
        }
    }

    /// Human-readable detail sent alongside a failure status.
    pub fn detail(&self) -> &'static str {
        match self {
            Status::Ok => "",
            Status::PermissionDenied => "Permission denied",
            Status::InvalidToken => "Could not parse auth token.",
            Status::DataStale => "Transaction hash does not match",
        }
    }
}

/// Connection handshake, sent once when a session opens.
pub fn handshake(timestamp: i64, host: &str) -> Value {
    json!({
        "t": "c",
        "d": {
            "t": "h",
            "d": {"ts": timestamp, "v": PROTOCOL_VERSION, "h": host, "s": ""}
        }
    })
}

/// Successful response to request `request_id`.
pub fn ack(request_id: Option<u64>, data: Value) -> Value {
    json!({"t": "d", "d": {"r": request_id, "b": {"s": Status::Ok.as_str(), "d": data}}})
}

/// Failure response to request `request_id`.
pub fn status(request_id: Option<u64>, status: Status) -> Value {
    json!({"t": "d", "d": {"r": request_id, "b": {"s": status.as_str(), "d": status.detail()}}})
}

/// Unsolicited data update for `path`.
pub fn push(path: &str, data: Value) -> Value {
    json!({"t": "d", "d": {"a": "d", "b": {"p": path, "d": data}}})
}

/// Server-side cancellation of a listener on `path`.
pub fn listen_revoked(path: &str, status: Status) -> Value {
    json!({"t": "d", "d": {"a": "c", "b": {"p": path, "msg": status.as_str()}}})
}
