//! List registered drones.

use anyhow::Result;
use clap::Args;
use gitfleet_wire::ListDronesResponse;
use tabled::Tabled;

use crate::output::{print_json, print_output, OutputFormat};

use super::CommandContext;

/// Hosts flags.
#[derive(Debug, Args)]
pub struct HostsCommand {}

#[derive(Debug, serde::Serialize, Tabled)]
struct DroneRow {
    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Address")]
    addr: String,
}

impl HostsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let response: ListDronesResponse = ctx.client.get("/v1/drones").await?;

        if ctx.format == OutputFormat::Json {
            print_json(&response);
            return Ok(());
        }

        let rows: Vec<DroneRow> = response
            .drones
            .into_iter()
            .map(|d| DroneRow {
                id: d.id.to_string(),
                addr: d.addr,
            })
            .collect();
        print_output(&rows, ctx.format);
        Ok(())
    }
}
