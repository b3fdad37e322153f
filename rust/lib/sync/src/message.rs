//! Live channel message decoding.
//!
//! Envelope: `{"type": "...", "data": {...}}` (or `payload` instead of
//! `data`). Anything that does not decode into one of the two known shapes is
//! dropped here and never reaches the board.

use mfgsuite_schedule::{Board, OperationPatch};
use serde_json::Value;
use tracing::debug;

pub const SNAPSHOT_TYPE: &str = "scheduler.schedule.update";

pub const DELTA_TYPES: [&str; 4] = [
    "scheduler.operation.move",
    "scheduler.operation.assign",
    "scheduler.operation.update",
    "scheduler.operation.status",
];

const DELTA_FIELDS: [&str; 4] = ["start", "end", "workCenterId", "status"];

/// One frame off the wire, independent of the socket library.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    Snapshot(Board),
    Delta {
        operation_id: String,
        patch: OperationPatch,
    },
}

pub fn decode_frame(frame: &Frame) -> Option<LiveMessage> {
    match frame {
        Frame::Text(text) => decode_text(text),
        Frame::Binary(bytes) => std::str::from_utf8(bytes).ok().and_then(decode_text),
        Frame::Ping | Frame::Pong | Frame::Close => None,
    }
}

/// Decode a text frame. A JSON string is unwrapped and decoded once more;
/// text that is not JSON is opaque and dropped.
pub fn decode_text(text: &str) -> Option<LiveMessage> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            debug!("live: opaque frame dropped ({} bytes)", text.len());
            return None;
        }
    };
    match value {
        Value::String(inner) => serde_json::from_str::<Value>(&inner)
            .ok()
            .and_then(|v| decode_value(&v)),
        other => decode_value(&other),
    }
}

pub fn decode_value(value: &Value) -> Option<LiveMessage> {
    let obj = value.as_object()?;

    let Some(kind) = obj.get("type").and_then(Value::as_str) else {
        // Untyped: a bare operation object counts as a delta.
        let looks_like_delta = obj.contains_key("id") && DELTA_FIELDS.iter().any(|f| obj.contains_key(*f));
        return if looks_like_delta { delta(value) } else { None };
    };

    let data = ["data", "payload"]
        .iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .unwrap_or(value);

    if kind == SNAPSHOT_TYPE {
        data.get("id")?;
        return match serde_json::from_value::<Board>(data.clone()) {
            Ok(board) => Some(LiveMessage::Snapshot(board)),
            Err(e) => {
                debug!("live: snapshot dropped: {e}");
                None
            }
        };
    }
    if DELTA_TYPES.contains(&kind) {
        return delta(data);
    }
    debug!("live: ignoring message type {kind}");
    None
}

fn delta(data: &Value) -> Option<LiveMessage> {
    let operation_id = match data.get("id")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match serde_json::from_value::<OperationPatch>(data.clone()) {
        Ok(patch) => Some(LiveMessage::Delta { operation_id, patch }),
        Err(e) => {
            debug!("live: delta for {operation_id} dropped: {e}");
            None
        }
    }
}
