//! Run the hub in-process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

/// Hub flags.
#[derive(Debug, Args)]
pub struct HubCommand {
    /// Address the control API and drone link listen on.
    #[arg(long, env = "FLEET_LISTEN", default_value = "127.0.0.1:7000")]
    listen: SocketAddr,

    /// Base directory holding the authoritative repositories.
    #[arg(long, env = "FLEET_BASEDIR")]
    basedir: Option<PathBuf>,

    /// Git fetch base URL advertised to drones.
    #[arg(long, env = "FLEET_GIT_URL", default_value = "http://127.0.0.1:7001")]
    git_url: String,

    /// Per-call deadline for drone commands, in seconds.
    #[arg(long, env = "FLEET_CALL_TIMEOUT_SECS", default_value_t = 60)]
    call_timeout: u64,
}

impl HubCommand {
    pub async fn run(self, secret: String) -> Result<()> {
        let basedir = match self.basedir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        gitfleet_hub::run(gitfleet_hub::Config {
            listen: self.listen,
            secret,
            basedir,
            git_url: self.git_url,
            call_timeout: Duration::from_secs(self.call_timeout),
        })
        .await
    }
}
