//! Wire codec for sidecar frames.
//!
//! Frames are JSON objects with a mandatory `type` string; all other fields
//! are event-specific payload. Liveness probes correlate by echoing the ping
//! `timestamp` token verbatim.

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};

use crate::handle::SidecarError;

pub const PING_EVENT: &str = "ping";
pub const PONG_EVENT: &str = "pong";
pub const STATS_ACK_EVENT: &str = "ack_stats";

/// Inbound sidecar frames, decoded into a tagged variant per known event
/// type. Types without a dedicated variant still reach subscribers through
/// [`SidecarEvent::Unknown`].
#[derive(Debug, Clone, PartialEq)]
pub enum SidecarEvent {
    /// Reply to a liveness probe, echoing the probe's timestamp token.
    Pong { timestamp: String },
    /// Statistics report answering a context-carrying `stats` request.
    StatsReport { payload: Value },
    Unknown { kind: String, payload: Value },
}

impl SidecarEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Pong { .. } => PONG_EVENT,
            Self::StatsReport { .. } => STATS_ACK_EVENT,
            Self::Unknown { kind, .. } => kind,
        }
    }
}

/// Decodes one inbound frame.
pub fn decode_event(raw: &str) -> Result<SidecarEvent> {
    let value: Value = serde_json::from_str(raw).context("failed to parse sidecar frame JSON")?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        bail!("sidecar frame is missing a string `type` field");
    };
    Ok(match kind {
        PONG_EVENT => SidecarEvent::Pong {
            timestamp: value
                .get("timestamp")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        STATS_ACK_EVENT => SidecarEvent::StatsReport { payload: value },
        _ => SidecarEvent::Unknown {
            kind: kind.to_string(),
            payload: value,
        },
    })
}

/// Encodes an outbound event as `{type, ...payload}`.
///
/// `payload` must be a JSON object (or null for none); its fields are
/// flattened next to `type`.
pub fn encode_event(kind: &str, payload: Value) -> Result<String, SidecarError> {
    let mut fields = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => return Err(SidecarError::InvalidPayload),
    };
    fields.insert("type".to_string(), Value::String(kind.to_string()));
    Ok(Value::Object(fields).to_string())
}

pub fn encode_ping(token: &str) -> Result<String, SidecarError> {
    encode_event(PING_EVENT, json!({ "timestamp": token }))
}
