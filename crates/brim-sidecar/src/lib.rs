//! Persistent bridge to the restricted-API sidecar backend.
//!
//! Maintains one duplex websocket connection with reconnect-on-failure, a
//! periodic liveness probe measuring round-trip latency, and a broadcast
//! event bus re-dispatching inbound frames so other components can subscribe
//! without depending on the connection manager directly.

pub mod frames;
pub mod handle;
pub mod runtime;

pub use frames::SidecarEvent;
pub use handle::{SidecarError, SidecarHandle};
pub use runtime::{
    sidecar_bridge, SidecarBridgeConfig, SidecarBridgeRuntime, DEFAULT_PROBE_INTERVAL,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_RECONNECT_DELAY,
};
