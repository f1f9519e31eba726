//! # rollcall-server
//!
//! HTTP server for the rollcall geolocation attendance system.
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package rollcall-server
//!
//! # With an explicit configuration file
//! ROLLCALL_CONFIG=./rollcall.toml ./rollcall-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use rollcall_core::Config;
use rollcall_server::api::create_router;
use rollcall_server::logging;
use rollcall_server::state::AppState;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    logging::init(config.server.production)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting rollcall-server");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = AppState::new(config).context("failed to initialize application state")?;
    let app = create_router(state.into_shared());

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
