//! `chatline`: direct messages over HTTP, live events over websocket.
//!
//! Settings come from `chatline.toml` (or the file named by
//! `CHATLINE_CONFIG`) with `CHATLINE__SECTION__KEY` overrides, e.g.
//!
//! ```bash
//! CHATLINE__PORT=9000 CHATLINE__MESSAGING__EDIT_WINDOW_SECS=900 chatline
//! ```

mod auth;
mod config;
mod error;
mod http;
mod metrics;
mod state;
mod ws;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "chatline=debug,tower_http=debug";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = config::Config::load().context("loading configuration")?;
    debug!(?config, "Effective configuration");
    info!(
        host = %config.host,
        port = config.port,
        encoding = ?config.transport.encoding,
        edit_window_secs = config.messaging.edit_window_secs,
        "Starting chatline"
    );

    if config.metrics.enabled {
        metrics::init_metrics();
    }

    http::run_server(config).await
}
