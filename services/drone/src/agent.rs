//! Hub link client.
//!
//! The agent dials the hub's link endpoint, performs the hello/ready
//! handshake, and serves commands over the socket for as long as it stays
//! up. On any disconnect it retries with jittered exponential backoff. The
//! supervisor (and its process table) lives outside the session, so
//! workloads keep running across link outages.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, Stream, StreamExt};
use gitfleet_wire::{CommandReply, DroneCommand, DroneFrame, HubFrame};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{spawn_observer, DroneEvent};
use crate::pipeline::Pipeline;
use crate::supervisor::{Supervisor, SupervisorHandle, SupervisorTimings};

const RECONNECT_MIN: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Run the drone agent until the process is terminated.
pub async fn run(config: Config) -> Result<()> {
    info!(drone_id = %config.drone_id, hub = %config.hub, "drone agent starting");

    tokio::fs::create_dir_all(config.repo_dir())
        .await
        .with_context(|| format!("creating {}", config.repo_dir().display()))?;
    tokio::fs::create_dir_all(config.deploy_dir())
        .await
        .with_context(|| format!("creating {}", config.deploy_dir().display()))?;

    let (events_tx, events_rx) = mpsc::channel(256);
    spawn_observer(events_rx);

    let (supervisor, handle) = Supervisor::new(
        config.drone_id,
        config.deploy_dir(),
        events_tx.clone(),
        SupervisorTimings::default(),
    );
    tokio::spawn(supervisor.run());

    let mut backoff = RECONNECT_MIN;
    loop {
        match session(&config, &handle, &events_tx).await {
            Ok(()) => {
                let _ = events_tx
                    .send(DroneEvent::LinkDown {
                        reason: "link closed".to_string(),
                    })
                    .await;
                backoff = RECONNECT_MIN;
            }
            Err(e) => {
                let _ = events_tx
                    .send(DroneEvent::LinkDown {
                        reason: e.to_string(),
                    })
                    .await;
            }
        }

        let jitter = {
            use ::rand::Rng as _;
            ::rand::rng().random_range(0..backoff.as_millis().max(1) as u64)
        };
        tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

/// One connected session: handshake, then serve commands until the socket
/// drops.
async fn session(
    config: &Config,
    supervisor: &SupervisorHandle,
    events: &mpsc::Sender<DroneEvent>,
) -> Result<()> {
    let url = format!("ws://{}/v1/link", config.hub);
    let (ws, _) = connect_async(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    let (mut sink, mut stream) = ws.split();

    let hello = DroneFrame::Hello {
        secret: config.secret.clone(),
        drone_id: config.drone_id,
    };
    sink.send(Message::Text(serde_json::to_string(&hello)?.into()))
        .await?;

    let git_url = match recv_frame(&mut stream).await? {
        Some(HubFrame::Ready { git_url }) => git_url,
        Some(HubFrame::Denied { reason }) => bail!("hub denied registration: {reason}"),
        Some(other) => bail!("unexpected frame before ready: {other:?}"),
        None => bail!("link closed during handshake"),
    };

    let _ = events
        .send(DroneEvent::LinkUp {
            hub: config.hub.clone(),
        })
        .await;

    let pipeline = Pipeline::new(config.repo_dir(), config.deploy_dir(), git_url);

    // Replies funnel through a channel so command handlers can run
    // concurrently while one task owns the sink.
    let (reply_tx, mut reply_rx) = mpsc::channel::<DroneFrame>(64);
    let writer = tokio::spawn(async move {
        while let Some(frame) = reply_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let result = loop {
        match recv_frame(&mut stream).await {
            Ok(Some(HubFrame::Command { call_id, command })) => {
                let supervisor = supervisor.clone();
                let pipeline = pipeline.clone();
                let events = events.clone();
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    let reply = handle_command(command, &supervisor, &pipeline, &events).await;
                    let _ = reply_tx.send(DroneFrame::Reply { call_id, reply }).await;
                });
            }
            Ok(Some(frame)) => {
                debug!(frame = ?frame, "ignoring unexpected frame");
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    drop(reply_tx);
    writer.abort();
    result
}

/// Read the next decodable frame, skipping pings and other non-text traffic.
async fn recv_frame<S>(stream: &mut S) -> Result<Option<HubFrame>>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        match msg.context("link read failed")? {
            Message::Text(text) => {
                let frame: HubFrame =
                    serde_json::from_str(&text).context("malformed hub frame")?;
                return Ok(Some(frame));
            }
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

/// Execute one hub command against the local pipeline and supervisor.
async fn handle_command(
    command: DroneCommand,
    supervisor: &SupervisorHandle,
    pipeline: &Pipeline,
    events: &mpsc::Sender<DroneEvent>,
) -> CommandReply {
    match command {
        DroneCommand::Fetch { repo } => {
            let error = pipeline.fetch(&repo).await.err().map(|e| {
                warn!(step = %e.step, repo = %repo, "git step failed");
                e.into_failure()
            });
            CommandReply::Fetch { error }
        }
        DroneCommand::Deploy(req) => match pipeline.deploy(&req.repo, &req.commit).await {
            Ok(tree) => {
                let _ = events
                    .send(DroneEvent::Deploy {
                        repo: req.repo,
                        commit: req.commit,
                        cwd: tree.display().to_string(),
                    })
                    .await;
                CommandReply::Deploy { error: None }
            }
            Err(e) => {
                warn!(step = %e.step, repo = %req.repo, "git step failed");
                CommandReply::Deploy {
                    error: Some(e.into_failure()),
                }
            }
        },
        DroneCommand::Spawn(req) => {
            let pids = supervisor.spawn(req).await.unwrap_or_default();
            CommandReply::Spawn { pids }
        }
        DroneCommand::Stop { target } => {
            let pids = supervisor.stop(target).await.unwrap_or_default();
            CommandReply::Stop { pids }
        }
        DroneCommand::Restart { pid } => {
            let error = match supervisor.restart(pid).await {
                Ok(()) => None,
                Err(e) => Some(e.to_string()),
            };
            CommandReply::Restart { error }
        }
        DroneCommand::Ps => {
            let procs = supervisor.ps().await.unwrap_or_default();
            CommandReply::Ps { procs }
        }
    }
}
