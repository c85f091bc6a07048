//! Connect, read, and liveness-probe loops for the sidecar bridge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use brim_core::current_unix_timestamp_secs;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use crate::frames::{self, SidecarEvent};
use crate::handle::{SidecarHandle, SidecarShared};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SidecarBridgeConfig {
    pub url: String,
    /// Fixed delay between reconnect attempts; no exponential backoff.
    pub reconnect_delay: Duration,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
}

impl SidecarBridgeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Creates a bridge runtime plus the handle other components use to reach it.
///
/// The runtime runs until `shutdown` flips to true (or its sender drops); the
/// handle stays valid across reconnects.
pub fn sidecar_bridge(
    config: SidecarBridgeConfig,
    shutdown: watch::Receiver<bool>,
) -> (SidecarBridgeRuntime, SidecarHandle) {
    let shared = Arc::new(SidecarShared::new());
    let handle = SidecarHandle::new(shared.clone());
    let runtime = SidecarBridgeRuntime {
        config,
        shared,
        shutdown,
    };
    (runtime, handle)
}

/// How one connected session ended.
enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Pending liveness probe awaiting its echoed token.
struct PendingProbe {
    token: String,
    sent_at: Instant,
    deadline: Instant,
}

/// Owns the connect loop; one live websocket session at a time.
pub struct SidecarBridgeRuntime {
    config: SidecarBridgeConfig,
    shared: Arc<SidecarShared>,
    shutdown: watch::Receiver<bool>,
}

impl SidecarBridgeRuntime {
    /// Runs the connect loop until shutdown. Connect failures are retried
    /// indefinitely with the fixed reconnect delay and never bubble up.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }
            // Shutdown must interrupt a stalled handshake, not just the
            // delays between attempts.
            let stream = tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
                connected = connect_async(self.config.url.as_str()) => match connected {
                    Ok((stream, _response)) => stream,
                    Err(error) => {
                        tracing::warn!(
                            %error,
                            url = %self.config.url,
                            delay_ms = self.config.reconnect_delay.as_millis() as u64,
                            "sidecar connect failed, retrying"
                        );
                        if self.wait_reconnect_delay().await {
                            return Ok(());
                        }
                        continue;
                    }
                }
            };
            tracing::info!(url = %self.config.url, "connected to sidecar backend");

            let end = self.run_session(stream).await;
            // Probe state dies with the session; latency must read unknown
            // before the next connect attempt starts.
            self.shared.reset();
            match end {
                Ok(SessionEnd::Shutdown) => {
                    tracing::info!("disconnected from sidecar backend");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => {
                    tracing::info!("disconnected from sidecar backend");
                }
                Err(error) => {
                    tracing::warn!(%error, "sidecar session failed");
                }
            }
            if self.wait_reconnect_delay().await {
                return Ok(());
            }
        }
    }

    /// Waits out the reconnect delay; returns true when shutdown arrived
    /// during the wait.
    async fn wait_reconnect_delay(&mut self) -> bool {
        tokio::select! {
            changed = self.shutdown.changed() => {
                changed.is_err() || *self.shutdown.borrow()
            }
            _ = tokio::time::sleep(self.config.reconnect_delay) => false,
        }
    }

    /// Drives one connected session: inbound reads, outbound writes, and the
    /// liveness probe all interleave here. Any write failure tears the whole
    /// session down rather than attempting in-place repair.
    async fn run_session(
        &mut self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> Result<SessionEnd> {
        let shared = self.shared.clone();
        let probe_timeout = self.config.probe_timeout;
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        shared.install_session(outbound_tx);

        let mut probe = tokio::time::interval(self.config.probe_interval);
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut pending_probe: Option<PendingProbe> = None;

        loop {
            let probe_deadline = pending_probe
                .as_ref()
                .map(|probe| probe.deadline)
                .unwrap_or_else(Instant::now);
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        // Best-effort close; the peer may already be gone.
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                maybe_frame = source.next() => {
                    let Some(frame_result) = maybe_frame else {
                        return Ok(SessionEnd::Disconnected);
                    };
                    let frame =
                        frame_result.context("failed reading sidecar websocket frame")?;
                    match frame {
                        WsMessage::Text(text) => {
                            handle_frame(&shared, text.as_str(), &mut pending_probe);
                        }
                        WsMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
                            Ok(text) => handle_frame(&shared, text, &mut pending_probe),
                            Err(_) => {
                                tracing::debug!("ignoring non-utf8 sidecar frame");
                            }
                        },
                        WsMessage::Close(_) => return Ok(SessionEnd::Disconnected),
                        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                    }
                }
                Some(frame) = outbound_rx.recv() => {
                    sink.send(WsMessage::Text(frame.into()))
                        .await
                        .context("failed writing sidecar websocket frame")?;
                }
                _ = probe.tick() => {
                    if pending_probe.is_some() {
                        // Unanswered probe from the previous cycle; the new
                        // token becomes the only one accepted.
                        pending_probe = None;
                    }
                    let token = current_unix_timestamp_secs().to_string();
                    let frame = frames::encode_ping(&token)?;
                    sink.send(WsMessage::Text(frame.into()))
                        .await
                        .context("failed writing sidecar liveness probe")?;
                    pending_probe = Some(PendingProbe {
                        token,
                        sent_at: Instant::now(),
                        deadline: Instant::now() + probe_timeout,
                    });
                }
                _ = tokio::time::sleep_until(probe_deadline), if pending_probe.is_some() => {
                    // Timed-out probe: latency keeps its last known value.
                    tracing::debug!("sidecar liveness probe timed out");
                    pending_probe = None;
                }
            }
        }
    }
}

/// Decodes one inbound frame, settles a pending probe on a matching pong, and
/// re-dispatches the event on the bus.
fn handle_frame(shared: &SidecarShared, raw: &str, pending_probe: &mut Option<PendingProbe>) {
    let event = match frames::decode_event(raw) {
        Ok(event) => event,
        Err(error) => {
            tracing::debug!(%error, "ignoring undecodable sidecar frame");
            return;
        }
    };
    if let SidecarEvent::Pong { timestamp } = &event {
        match pending_probe.as_ref() {
            Some(probe) if probe.token == *timestamp => {
                let round_trip = probe.sent_at.elapsed();
                shared.record_latency(round_trip);
                tracing::debug!(
                    latency_ms = round_trip.as_millis() as u64,
                    "sidecar liveness probe answered"
                );
                *pending_probe = None;
            }
            Some(_) => {
                tracing::debug!(token = %timestamp, "ignoring pong with mismatched token");
            }
            None => {}
        }
    }
    shared.publish(event);
}
