//! teamserver: a minimal concurrent TCP request router
//!
//! Serves the built-in endpoints (ping, echo, info) over the framed
//! request/response protocol. Each connection carries one request.
//!
//! Features:
//! - Configuration via CLI arguments or TOML file
//! - Bounded receive/send on every connection
//! - Ctrl-C triggers a graceful shutdown with a bounded drain

mod config;
mod endpoints;

use config::Config;
use teamserver::{ServerOption, TeamServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut options = config.server_options();
    options.push(ServerOption::Endpoints(endpoints::builtin()));
    let server = TeamServer::new(options)?;

    info!(
        listen = %server.listen_address(),
        recv_timeout = ?server.recv_timeout(),
        send_timeout = ?server.send_timeout(),
        drain_timeout = ?server.drain_timeout(),
        endpoints = ?server.endpoints(),
        "Starting teamserver"
    );

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown.shutdown();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    server.start().await?;
    Ok(())
}
