//! Run a drone agent in-process.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use gitfleet_id::DroneId;

/// Drone agent flags.
#[derive(Debug, Args)]
pub struct DroneCommand {
    /// Base directory for mirrors and working trees.
    #[arg(long, env = "FLEET_BASEDIR")]
    basedir: Option<PathBuf>,

    /// Pin the drone id instead of generating one at startup.
    #[arg(long, env = "FLEET_DRONE_ID")]
    id: Option<DroneId>,
}

impl DroneCommand {
    pub async fn run(self, hub: String, secret: String) -> Result<()> {
        let basedir = match self.basedir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        gitfleet_drone::run(gitfleet_drone::Config {
            drone_id: self.id.unwrap_or_else(DroneId::random),
            hub,
            secret,
            basedir,
        })
        .await
    }
}
