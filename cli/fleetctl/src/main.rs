//! fleet - CLI for the gitfleet control plane
//!
//! `fleet hub` and `fleet drone` run the services in-process; the remaining
//! subcommands drive a running hub's control API.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }

    Ok(())
}
