//! Deploy a commit across the fleet.

use anyhow::{bail, Result};
use clap::Args;
use gitfleet_wire::{DeployFailure, DeployParams, DeployResponse, Selector};
use tabled::Tabled;

use crate::output::{print_json, print_output, print_success, OutputFormat};

use super::{CommandContext, SelectorArgs};

/// Deploy flags.
#[derive(Debug, Args)]
pub struct DeployCommand {
    /// Repository name.
    repo: String,

    /// Commit hash to deploy.
    commit: String,

    #[command(flatten)]
    selector: SelectorArgs,
}

#[derive(Debug, serde::Serialize, Tabled)]
struct FailureRow {
    #[tabled(rename = "Drone")]
    drone: String,

    #[tabled(rename = "Phase")]
    phase: String,

    #[tabled(rename = "Code")]
    code: String,

    #[tabled(rename = "Message")]
    message: String,
}

impl From<&DeployFailure> for FailureRow {
    fn from(f: &DeployFailure) -> Self {
        Self {
            drone: f.drone.to_string(),
            phase: f.phase.to_string(),
            code: f
                .code
                .map(|c| c.to_string())
                .or_else(|| f.signal.map(|s| format!("signal {s}")))
                .unwrap_or_else(|| "-".to_string()),
            message: f.message.clone().unwrap_or_default(),
        }
    }
}

impl DeployCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let params = DeployParams {
            selector: self.selector.to_selector(Selector::All),
            repo: self.repo.clone(),
            commit: self.commit.clone(),
        };
        let response: DeployResponse = ctx.client.post("/v1/deploy", &params).await?;

        if ctx.format == OutputFormat::Json {
            print_json(&response);
        } else if response.failures.is_empty() {
            print_success(&format!("deployed {} at {}", self.repo, self.commit));
        } else {
            let rows: Vec<FailureRow> = response.failures.iter().map(Into::into).collect();
            print_output(&rows, ctx.format);
        }

        if !response.failures.is_empty() {
            bail!("deploy failed on {} drone(s)", response.failures.len());
        }
        Ok(())
    }
}
