//! Shared connection state and the caller-facing sidecar handle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use brim_core::InvocationContext;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::frames::{encode_event, SidecarEvent};

const EVENT_BUS_CAPACITY: usize = 64;

/// Errors surfaced to callers on the sidecar send path.
///
/// All variants are recoverable; callers surface [`SidecarError::NotConnected`]
/// to end users as "temporarily unavailable" rather than crashing.
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("not connected to the sidecar backend")]
    NotConnected,
    #[error("sidecar event payload must be a JSON object")]
    InvalidPayload,
}

/// Connection state shared between the bridge runtime and its handles.
///
/// The outbound writer is present only while a session is live; latency holds
/// the last measured probe round trip and is cleared on disconnect.
#[derive(Debug)]
pub(crate) struct SidecarShared {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    latency: Mutex<Option<Duration>>,
    events: broadcast::Sender<SidecarEvent>,
}

impl SidecarShared {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            outbound: Mutex::new(None),
            latency: Mutex::new(None),
            events,
        }
    }

    pub(crate) fn install_session(&self, writer: mpsc::UnboundedSender<String>) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        *outbound = Some(writer);
    }

    pub(crate) fn record_latency(&self, round_trip: Duration) {
        let mut latency = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        *latency = Some(round_trip);
    }

    /// Explicit state reset between sessions: drops the outbound writer and
    /// clears latency back to unknown.
    pub(crate) fn reset(&self) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        *outbound = None;
        drop(outbound);
        let mut latency = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        *latency = None;
    }

    /// Re-dispatches an inbound frame to subscribers; lagging or absent
    /// subscribers are not an error.
    pub(crate) fn publish(&self, event: SidecarEvent) {
        let _ = self.events.send(event);
    }
}

/// Cloneable handle exposing the sidecar connection to the rest of the bot.
#[derive(Debug, Clone)]
pub struct SidecarHandle {
    shared: Arc<SidecarShared>,
}

impl SidecarHandle {
    pub(crate) fn new(shared: Arc<SidecarShared>) -> Self {
        Self { shared }
    }

    /// Whether a session is currently live.
    pub fn is_connected(&self) -> bool {
        let outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        outbound.is_some()
    }

    /// Last measured probe round trip, or `None` while disconnected or before
    /// the first successful probe.
    pub fn latency(&self) -> Option<Duration> {
        let latency = self.shared.latency.lock().unwrap_or_else(|e| e.into_inner());
        *latency
    }

    /// Subscribes to inbound sidecar events.
    pub fn subscribe(&self) -> broadcast::Receiver<SidecarEvent> {
        self.shared.events.subscribe()
    }

    /// Queues an outbound `{type, ...payload}` event.
    ///
    /// Fails with [`SidecarError::NotConnected`] when no session is live. A
    /// writer whose session already ended counts as stale and is dropped on
    /// the spot; the runtime reconnect loop brings up the replacement.
    pub fn send_event(&self, kind: &str, payload: Value) -> Result<(), SidecarError> {
        let frame = encode_event(kind, payload)?;
        let mut outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let writer = outbound.as_ref().ok_or(SidecarError::NotConnected)?;
        if writer.send(frame).is_err() {
            *outbound = None;
            return Err(SidecarError::NotConnected);
        }
        Ok(())
    }

    /// Queues an outbound event carrying the invocation-context envelope under
    /// `ctx`, so the backend can echo it back for correlation.
    pub fn send_event_with_context(
        &self,
        kind: &str,
        ctx: &InvocationContext,
        payload: Value,
    ) -> Result<(), SidecarError> {
        let mut fields = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(SidecarError::InvalidPayload),
        };
        let envelope =
            serde_json::to_value(ctx.envelope()).map_err(|_| SidecarError::InvalidPayload)?;
        fields.insert("ctx".to_string(), envelope);
        self.send_event(kind, Value::Object(fields))
    }
}
