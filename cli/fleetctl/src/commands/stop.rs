//! Stop workloads.

use anyhow::{bail, Result};
use clap::Args;
use gitfleet_id::ProcessId;
use gitfleet_wire::{Selector, StopParams, StopResponse, StopTarget};
use tabled::Tabled;

use crate::output::{print_json, print_output, print_success, OutputFormat};

use super::{CommandContext, SelectorArgs};

/// Stop flags.
#[derive(Debug, Args)]
pub struct StopCommand {
    /// Process ids to stop, or `*` for every process.
    pids: Vec<String>,

    /// Stop every process whose commit starts with this prefix.
    #[arg(long, value_name = "PREFIX", conflicts_with = "pids")]
    commit: Option<String>,

    #[command(flatten)]
    selector: SelectorArgs,
}

#[derive(Debug, serde::Serialize, Tabled)]
struct StoppedRow {
    #[tabled(rename = "Drone")]
    drone: String,

    #[tabled(rename = "Process")]
    pid: String,
}

impl StopCommand {
    fn target(&self) -> Result<StopTarget> {
        if let Some(prefix) = &self.commit {
            return Ok(StopTarget::Commit {
                prefix: prefix.clone(),
            });
        }
        if self.pids.iter().any(|p| p == "*") {
            return Ok(StopTarget::All);
        }
        if self.pids.is_empty() {
            bail!("specify process ids, '*', or --commit PREFIX");
        }
        let pids: Result<Vec<ProcessId>, _> = self.pids.iter().map(|p| p.parse()).collect();
        match pids {
            Ok(pids) => Ok(StopTarget::Pids { pids }),
            Err(e) => bail!("invalid process id: {e}"),
        }
    }

    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let params = StopParams {
            selector: self.selector.to_selector(Selector::All),
            target: self.target()?,
        };
        let response: StopResponse = ctx.client.post("/v1/stop", &params).await?;

        if ctx.format == OutputFormat::Json {
            print_json(&response);
            return Ok(());
        }

        let total: usize = response.procs.values().map(Vec::len).sum();
        if total == 0 {
            print_success("nothing to stop");
            return Ok(());
        }
        let rows: Vec<StoppedRow> = response
            .procs
            .iter()
            .flat_map(|(drone, pids)| {
                pids.iter().map(|pid| StoppedRow {
                    drone: drone.to_string(),
                    pid: pid.to_string(),
                })
            })
            .collect();
        print_output(&rows, ctx.format);
        Ok(())
    }
}
