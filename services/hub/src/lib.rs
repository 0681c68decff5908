//! gitfleet hub
//!
//! The hub is the fleet's control plane: it keeps the registry of connected
//! drones, owns the authoritative bare repositories on disk, and exposes the
//! control API clients use to deploy, spawn, stop, and inspect workloads
//! across the fleet. Drones dial in over a WebSocket link and stay
//! registered for the lifetime of the socket.
//!
//! ## Architecture
//!
//! - **Registry**: live drone table keyed by id; re-registration replaces
//! - **Link**: the WebSocket endpoint drones connect to; owns call
//!   correlation for its socket
//! - **Dispatch**: selector resolution plus parallel fan-out/fan-in of
//!   fleet operations
//! - **API**: axum REST surface plus the streaming `ps` WebSocket

pub mod api;
pub mod config;
pub mod dispatch;
pub mod link;
pub mod registry;
pub mod state;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

pub use config::Config;
pub use state::AppState;

/// Run the hub until the process is terminated.
pub async fn run(config: Config) -> Result<()> {
    tokio::fs::create_dir_all(config.repo_dir())
        .await
        .with_context(|| format!("creating {}", config.repo_dir().display()))?;

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(listen = %config.listen, "hub listening");

    serve(listener, AppState::new(config)).await
}

/// Serve the hub on an already-bound listener. Split out so tests can bind
/// an ephemeral port first.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let router = api::router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("hub server failed")
}
