//! Drives a single WebSocket session against an echo server the way a session engine would.
//!
//! This example shows how to:
//! 1. Dial the server and inspect the handshake
//! 2. Run a dedicated read loop, which also processes pongs and close frames
//! 3. Send text messages and heartbeat pings from another task
//! 4. Close the session and release any pending ping
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,wsconn_adapter=debug cargo run --example echo --features tracing
//! ```
//!
//! Optionally target another server:
//! ```sh
//! WS_URL=ws://127.0.0.1:9001 RUST_LOG=info cargo run --example echo --features tracing
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;
use wsconn_adapter::types::{MessageType, StatusCode};
use wsconn_adapter::ws::config::Config;
use wsconn_adapter::ws::{ConnectionAdapter as _, TungsteniteConnectionAdapter};

const DEFAULT_URL: &str = "wss://echo.websocket.org";
const MESSAGES: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let url = Url::parse(&std::env::var("WS_URL").unwrap_or_else(|_| DEFAULT_URL.to_owned()))?;
    let config = Config::builder()
        .connect_timeout(Duration::from_secs(10))
        .control_write_timeout(Duration::from_secs(5))
        .build();
    let adapter = Arc::new(TungsteniteConnectionAdapter::new(config));
    let token = CancellationToken::new();

    let handshake = adapter.dial(&token, &url).await?;
    info!(%url, status = %handshake.status, "connected");

    let reader = {
        let adapter = Arc::clone(&adapter);
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                match adapter.read(&token).await {
                    Ok((kind, payload)) => {
                        info!(%kind, message = %String::from_utf8_lossy(&payload), "received");
                    }
                    Err(e) if e.kind().requires_redial() => {
                        info!(error = %e, "session ended");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "read failed");
                        break;
                    }
                }
            }
        })
    };

    let mut heartbeat = interval(Duration::from_secs(1));
    for n in 0..MESSAGES {
        heartbeat.tick().await;

        let text = format!("hello #{n}");
        adapter.write(&token, MessageType::Text, text.into_bytes()).await?;

        let ping_token = token.child_token();
        match timeout(Duration::from_secs(5), adapter.ping(&ping_token)).await {
            Ok(Ok(())) => info!("pong received"),
            Ok(Err(e)) => warn!(error = %e, "ping failed"),
            Err(_) => {
                ping_token.cancel();
                warn!("no pong within 5s");
            }
        }
    }

    adapter
        .close(&token, StatusCode::NORMAL_CLOSURE, Some("demo finished"))
        .await?;

    if timeout(Duration::from_secs(5), reader).await.is_err() {
        token.cancel();
    }

    Ok(())
}
