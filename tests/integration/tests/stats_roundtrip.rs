//! End-to-end flow: a locked stats command sends a context-carrying request
//! through the sidecar bridge, and the backend's echoed envelope correlates
//! the reply to the originating invocation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use brim_core::{AuthorRef, ChannelRef, GuildRef, InvocationContext};
use brim_dispatch::{Command, DispatchOutcome, Dispatcher};
use brim_sidecar::{sidecar_bridge, SidecarBridgeConfig, SidecarEvent, SidecarHandle};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};

struct StatsCommand {
    sidecar: SidecarHandle,
}

#[async_trait]
impl Command for StatsCommand {
    fn name(&self) -> &str {
        "stats"
    }

    fn locks_author(&self) -> bool {
        true
    }

    fn requires_sidecar(&self) -> bool {
        true
    }

    async fn invoke(&self, ctx: &InvocationContext) -> Result<()> {
        self.sidecar
            .send_event_with_context("stats", ctx, json!({}))
            .context("backend temporarily unavailable, try again later")?;
        Ok(())
    }
}

fn stats_context() -> InvocationContext {
    InvocationContext {
        author: AuthorRef {
            id: 70,
            name: "mallow".to_string(),
            discriminator: "0231".to_string(),
        },
        channel: ChannelRef {
            id: 71,
            name: Some("ops".to_string()),
        },
        guild: Some(GuildRef {
            id: 72,
            name: "testers".to_string(),
        }),
        message_id: 77,
    }
}

async fn read_json_frame(server: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), server.next())
            .await
            .expect("frame within deadline")
            .expect("stream open")
            .expect("readable frame");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("JSON frame");
        }
    }
}

#[tokio::test]
async fn stats_request_round_trips_with_context_correlation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = SidecarBridgeConfig {
        url: format!("ws://{addr}"),
        reconnect_delay: Duration::from_millis(25),
        probe_interval: Duration::from_secs(60),
        probe_timeout: Duration::from_secs(30),
    };
    let (runtime, handle) = sidecar_bridge(config, shutdown_rx);
    let mut events = handle.subscribe();

    let mut dispatcher = Dispatcher::new().with_sidecar_probe({
        let handle = handle.clone();
        move || handle.is_connected()
    });
    dispatcher.register(Arc::new(StatsCommand {
        sidecar: handle.clone(),
    }));

    // Before the bridge is up, the command is rejected rather than invoked.
    let outcome = dispatcher.dispatch("stats", &stats_context()).await;
    assert_eq!(outcome, DispatchOutcome::SidecarUnavailable);

    let runtime_task = tokio::spawn(runtime.run());
    let mut server = accept_async(listener.accept().await.expect("accept").0)
        .await
        .expect("websocket handshake");

    // First frame is the connect-time liveness probe.
    let ping = read_json_frame(&mut server).await;
    assert_eq!(ping["type"], "ping");

    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.is_connected() {
        assert!(Instant::now() < deadline, "bridge did not come up");
        sleep(Duration::from_millis(10)).await;
    }

    let outcome = dispatcher.dispatch("stats", &stats_context()).await;
    assert_eq!(outcome, DispatchOutcome::Completed);
    assert!(!dispatcher.locks().is_locked(70));

    let request = read_json_frame(&mut server).await;
    assert_eq!(request["type"], "stats");
    assert_eq!(request["ctx"]["author"]["id"], json!(70));
    assert_eq!(request["ctx"]["message"]["id"], json!(77));

    // The backend answers by echoing the envelope back.
    server
        .send(WsMessage::Text(
            json!({
                "type": "ack_stats",
                "ctx": request["ctx"],
                "process": {"cpu": 2.0, "used_ram": 1024},
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send stats ack");

    let reply = loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within deadline")
            .expect("event bus open");
        if let SidecarEvent::StatsReport { payload } = event {
            break payload;
        }
    };
    assert_eq!(reply["ctx"]["message"]["id"], json!(77));
    assert_eq!(reply["ctx"]["channel"]["id"], json!(71));

    shutdown_tx.send(true).expect("signal shutdown");
    runtime_task
        .await
        .expect("runtime task")
        .expect("clean shutdown");
}
