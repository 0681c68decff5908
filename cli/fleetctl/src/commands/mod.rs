//! CLI commands.

mod deploy;
mod drone;
mod hosts;
mod hub;
mod ps;
mod spawn;
mod stop;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gitfleet_wire::Selector;

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// gitfleet CLI - run the hub and drones, and drive the fleet.
#[derive(Debug, Parser)]
#[command(name = "fleet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Hub control address, host:port.
    #[arg(long, global = true, env = "FLEET_HUB", default_value = "127.0.0.1:7000")]
    hub: String,

    /// Shared fleet secret.
    #[arg(long, global = true, env = "FLEET_SECRET", default_value = "")]
    secret: String,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the hub.
    Hub(hub::HubCommand),

    /// Run a drone agent.
    Drone(drone::DroneCommand),

    /// Deploy a commit across the fleet.
    Deploy(deploy::DeployCommand),

    /// Spawn workloads out of a deployed commit.
    Spawn(spawn::SpawnCommand),

    /// Stream the fleet's process tables.
    Ps(ps::PsCommand),

    /// List registered drones.
    Hosts(hosts::HostsCommand),

    /// Stop workloads.
    Stop(stop::StopCommand),
}

/// Context shared by the control-API subcommands.
pub struct CommandContext {
    pub client: ApiClient,
    pub format: OutputFormat,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Hub(cmd) => cmd.run(self.secret).await,
            Commands::Drone(cmd) => cmd.run(self.hub, self.secret).await,
            other => {
                let ctx = CommandContext {
                    client: ApiClient::new(&self.hub, &self.secret)?,
                    format: if self.json {
                        OutputFormat::Json
                    } else {
                        OutputFormat::Table
                    },
                };
                match other {
                    Commands::Deploy(cmd) => cmd.run(ctx).await,
                    Commands::Spawn(cmd) => cmd.run(ctx).await,
                    Commands::Ps(cmd) => cmd.run(ctx).await,
                    Commands::Hosts(cmd) => cmd.run(ctx).await,
                    Commands::Stop(cmd) => cmd.run(ctx).await,
                    Commands::Hub(_) | Commands::Drone(_) => unreachable!(),
                }
            }
        }
    }
}

/// Drone selection flags shared by the fleet operations.
#[derive(Debug, Args)]
pub struct SelectorArgs {
    /// Target a specific drone id (repeatable).
    #[arg(long = "drone", value_name = "ID")]
    drones: Vec<String>,

    /// Target every registered drone.
    #[arg(long, conflicts_with = "drones")]
    all: bool,
}

impl SelectorArgs {
    /// Resolve the flags, falling back to `default` when neither was given.
    pub fn to_selector(&self, default: Selector) -> Selector {
        if self.all {
            Selector::All
        } else if !self.drones.is_empty() {
            Selector::Named {
                names: self.drones.clone(),
            }
        } else {
            default
        }
    }
}
