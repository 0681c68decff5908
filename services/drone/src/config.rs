//! Configuration for the drone agent.

use std::path::PathBuf;

use anyhow::Result;
use gitfleet_id::DroneId;

/// Drone agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier for this drone, generated once at agent start.
    pub drone_id: DroneId,

    /// Hub control address, `host:port`.
    pub hub: String,

    /// Shared secret presented in the link handshake.
    pub secret: String,

    /// Base directory holding `repos/` (bare mirrors) and `deploy/`
    /// (per-deployment working trees).
    pub basedir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Drone ID can be pinned or auto-generated
        let drone_id = std::env::var("FLEET_DRONE_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(DroneId::random);

        let hub = std::env::var("FLEET_HUB").unwrap_or_else(|_| "127.0.0.1:7000".to_string());

        let secret = std::env::var("FLEET_SECRET").unwrap_or_default();

        let basedir = std::env::var("FLEET_BASEDIR")
            .map(PathBuf::from)
            .or_else(|_| std::env::current_dir())?;

        Ok(Self {
            drone_id,
            hub,
            secret,
            basedir,
        })
    }

    /// Directory holding bare mirrors.
    pub fn repo_dir(&self) -> PathBuf {
        self.basedir.join("repos")
    }

    /// Directory holding per-deployment working trees.
    pub fn deploy_dir(&self) -> PathBuf {
        self.basedir.join("deploy")
    }
}
