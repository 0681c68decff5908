//! Configuration for the hub.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the control API and drone link listen on.
    pub listen: SocketAddr,

    /// Shared secret; checked against drone hellos and client bearer tokens.
    pub secret: String,

    /// Base directory holding `repos/` (the authoritative bare repositories).
    pub basedir: PathBuf,

    /// Git fetch base URL advertised to drones in the `ready` frame.
    pub git_url: String,

    /// Deadline for each hub-to-drone call.
    pub call_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen = std::env::var("FLEET_LISTEN")
            .unwrap_or_else(|_| "127.0.0.1:7000".to_string())
            .parse()
            .context("parsing FLEET_LISTEN")?;

        let secret = std::env::var("FLEET_SECRET").unwrap_or_default();

        let basedir = std::env::var("FLEET_BASEDIR")
            .map(PathBuf::from)
            .or_else(|_| std::env::current_dir())?;

        let git_url =
            std::env::var("FLEET_GIT_URL").unwrap_or_else(|_| "http://127.0.0.1:7001".to_string());

        let call_timeout = std::env::var("FLEET_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Ok(Self {
            listen,
            secret,
            basedir,
            git_url,
            call_timeout,
        })
    }

    /// Directory holding the authoritative bare repositories.
    pub fn repo_dir(&self) -> PathBuf {
        self.basedir.join("repos")
    }
}
