//! Stream the fleet's process tables.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use gitfleet_id::{DroneId, ProcessId};
use gitfleet_wire::{ProcessInfo, PsEvent};
use tabled::Tabled;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;

use crate::output::{print_json, print_output, OutputFormat};

use super::{CommandContext, SelectorArgs};

/// Ps flags.
#[derive(Debug, Args)]
pub struct PsCommand {
    #[command(flatten)]
    selector: SelectorArgs,
}

#[derive(Debug, serde::Serialize, Tabled)]
struct ProcessRow {
    #[tabled(rename = "Process")]
    pid: String,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "Repo")]
    repo: String,

    #[tabled(rename = "Commit")]
    commit: String,

    #[tabled(rename = "Command")]
    command: String,
}

impl From<(&ProcessId, &ProcessInfo)> for ProcessRow {
    fn from((pid, info): (&ProcessId, &ProcessInfo)) -> Self {
        Self {
            pid: pid.to_string(),
            status: info.status.to_string(),
            repo: info.repo.clone(),
            commit: info.commit.clone(),
            command: info.command.join(" "),
        }
    }
}

impl PsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let query = if self.selector.drones.is_empty() {
            String::new()
        } else {
            format!("?drones={}", self.selector.drones.join(","))
        };

        let mut request = ctx
            .client
            .ws_url(&format!("/v1/ps{query}"))
            .into_client_request()
            .context("building ps request")?;
        request.headers_mut().insert(
            AUTHORIZATION,
            format!("Bearer {}", ctx.client.secret())
                .parse()
                .context("secret is not a valid header value")?,
        );

        let (mut ws, _) = connect_async(request)
            .await
            .context("connecting to the hub")?;

        let mut collected: BTreeMap<DroneId, BTreeMap<ProcessId, ProcessInfo>> = BTreeMap::new();
        while let Some(msg) = ws.next().await {
            let msg = msg.context("ps stream failed")?;
            let Message::Text(text) = msg else {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
                continue;
            };
            let event: PsEvent = serde_json::from_str(&text).context("malformed ps event")?;
            match event {
                PsEvent::Addr { drone, addr } => {
                    if ctx.format == OutputFormat::Table {
                        println!("{} {}", format!("drone {drone}").bold(), addr.dimmed());
                    }
                }
                PsEvent::Data { drone, procs } => {
                    if ctx.format == OutputFormat::Table {
                        println!("{}", format!("drone {drone}").bold());
                        let rows: Vec<ProcessRow> = procs.iter().map(Into::into).collect();
                        print_output(&rows, ctx.format);
                    } else {
                        collected.insert(drone, procs);
                    }
                }
                PsEvent::End => break,
            }
        }

        if ctx.format == OutputFormat::Json {
            print_json(&collected);
        }
        Ok(())
    }
}
