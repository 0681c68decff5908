//! Spawn workloads out of a deployed commit.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use clap::Args;
use gitfleet_wire::{Selector, SpawnParams, SpawnRequest, SpawnResponse};
use tabled::Tabled;

use crate::output::{print_json, print_output, OutputFormat};

use super::{CommandContext, SelectorArgs};

/// Spawn flags.
#[derive(Debug, Args)]
pub struct SpawnCommand {
    /// Repository name.
    repo: String,

    /// Commit hash the workload belongs to.
    commit: String,

    /// Workload command, after `--`.
    #[arg(last = true, required = true)]
    command: Vec<String>,

    /// Number of processes to spawn per selected drone.
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Per-drone cap on processes for this commit.
    #[arg(long)]
    limit: Option<u32>,

    /// Respawn-count threshold before the workload is marked broken.
    #[arg(long)]
    errlimit: Option<u32>,

    /// KEY=VALUE pair injected into the workload environment (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Working directory override.
    #[arg(long)]
    cwd: Option<String>,

    /// Do not respawn when the workload exits.
    #[arg(long)]
    once: bool,

    #[command(flatten)]
    selector: SelectorArgs,
}

#[derive(Debug, serde::Serialize, Tabled)]
struct SpawnRow {
    #[tabled(rename = "Drone")]
    drone: String,

    #[tabled(rename = "Process")]
    pid: String,
}

impl SpawnCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let mut env = BTreeMap::new();
        for pair in &self.env {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("--env takes KEY=VALUE, got {pair:?}");
            };
            env.insert(key.to_string(), value.to_string());
        }

        let params = SpawnParams {
            selector: self.selector.to_selector(Selector::Random),
            spawn: SpawnRequest {
                repo: self.repo,
                commit: self.commit,
                command: self.command,
                count: self.count,
                limit: self.limit,
                errlimit: self.errlimit,
                env,
                cwd: self.cwd,
                once: self.once,
            },
        };
        let response: SpawnResponse = ctx.client.post("/v1/spawn", &params).await?;

        if ctx.format == OutputFormat::Json {
            print_json(&response);
            return Ok(());
        }

        let rows: Vec<SpawnRow> = response
            .procs
            .iter()
            .flat_map(|(drone, pids)| {
                pids.iter().map(|pid| SpawnRow {
                    drone: drone.to_string(),
                    pid: pid.to_string(),
                })
            })
            .collect();
        print_output(&rows, ctx.format);
        Ok(())
    }
}
