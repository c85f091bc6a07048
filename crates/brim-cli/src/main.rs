//! Daemon bootstrap: starts the sidecar bridge and logs its event stream.
//!
//! The chat client layer embeds `brim-dispatch` and `brim-sidecar` as
//! libraries; this binary runs the bridge standalone for operating and
//! debugging the backend connection.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use brim_sidecar::{sidecar_bridge, SidecarBridgeConfig};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(name = "brim", about = "Chat-bot sidecar bridge daemon", version)]
struct Cli {
    #[arg(
        long,
        env = "BRIM_SIDECAR_URL",
        help = "Websocket endpoint of the restricted-API sidecar backend."
    )]
    sidecar_url: String,

    #[arg(
        long,
        env = "BRIM_RECONNECT_DELAY_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Fixed delay between reconnect attempts in milliseconds."
    )]
    reconnect_delay_ms: u64,

    #[arg(
        long,
        env = "BRIM_PROBE_INTERVAL_MS",
        default_value_t = 60_000,
        value_parser = parse_positive_u64,
        help = "Liveness probe interval in milliseconds."
    )]
    probe_interval_ms: u64,

    #[arg(
        long,
        env = "BRIM_PROBE_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "How long to wait for a probe's pong in milliseconds."
    )]
    probe_timeout_ms: u64,
}

impl Cli {
    fn bridge_config(&self) -> SidecarBridgeConfig {
        SidecarBridgeConfig {
            url: self.sidecar_url.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (runtime, handle) = sidecar_bridge(cli.bridge_config(), shutdown_rx);

    let mut events = handle.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(kind = event.kind(), "sidecar event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sidecar event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let runtime_task = tokio::spawn(runtime.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    runtime_task.await.context("sidecar runtime task")??;
    event_logger.abort();
    Ok(())
}
