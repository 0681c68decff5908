//! The WebSocket endpoint drones connect to.
//!
//! Each accepted socket runs one link task. The task performs the
//! hello/ready handshake, registers the drone, and then multiplexes calls
//! over the socket: outbound commands are numbered with a per-link call id
//! and the matching reply completes the caller's oneshot. When the socket
//! closes the task deregisters the drone and drops every pending sender, so
//! in-flight calls fail fast instead of waiting out their deadline.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gitfleet_wire::{CallId, CommandReply, DroneCommand, DroneFrame, HubFrame};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::registry::{DroneLink, OutboundCall};
use crate::state::AppState;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const CALL_BUFFER: usize = 64;

pub fn routes() -> Router<AppState> {
    Router::new().route("/link", get(link))
}

async fn link(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_link(socket, addr, state))
}

async fn handle_link(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let hello = tokio::time::timeout(HANDSHAKE_TIMEOUT, recv_frame(&mut stream)).await;
    let (secret, drone_id) = match hello {
        Ok(Some(DroneFrame::Hello { secret, drone_id })) => (secret, drone_id),
        Ok(Some(frame)) => {
            warn!(addr = %addr, frame = ?frame, "link opened with a non-hello frame");
            return;
        }
        Ok(None) => return,
        Err(_) => {
            warn!(addr = %addr, "link handshake timed out");
            return;
        }
    };

    if secret != state.config().secret {
        warn!(addr = %addr, drone_id = %drone_id, "drone presented a bad secret");
        let _ = send_frame(
            &mut sink,
            &HubFrame::Denied {
                reason: "bad secret".to_string(),
            },
        )
        .await;
        return;
    }

    if send_frame(
        &mut sink,
        &HubFrame::Ready {
            git_url: state.config().git_url.clone(),
        },
    )
    .await
    .is_err()
    {
        return;
    }

    let (calls_tx, mut calls_rx) = mpsc::channel::<OutboundCall>(CALL_BUFFER);
    let handle = state
        .registry()
        .register(drone_id, addr.to_string(), calls_tx);
    let epoch = handle.epoch();

    spawn_catch_up(state.clone(), handle);

    // Pending replies, keyed by call id. Dropped wholesale on link loss,
    // which completes the callers' oneshots with an error.
    let mut pending: HashMap<CallId, oneshot::Sender<CommandReply>> = HashMap::new();
    let mut next_call_id: CallId = 0;

    loop {
        tokio::select! {
            out = calls_rx.recv() => {
                let Some(OutboundCall { command, reply }) = out else {
                    break;
                };
                next_call_id += 1;
                let call_id = next_call_id;
                let frame = HubFrame::Command { call_id, command };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
                pending.insert(call_id, reply);
            }
            frame = recv_frame(&mut stream) => {
                match frame {
                    Some(DroneFrame::Reply { call_id, reply }) => {
                        match pending.remove(&call_id) {
                            Some(tx) => {
                                let _ = tx.send(reply);
                            }
                            None => {
                                debug!(drone_id = %drone_id, call_id, "reply for unknown call");
                            }
                        }
                    }
                    Some(frame) => {
                        debug!(drone_id = %drone_id, frame = ?frame, "ignoring unexpected frame");
                    }
                    None => break,
                }
            }
        }
    }

    state.registry().deregister(drone_id, epoch);
    info!(drone_id = %drone_id, addr = %addr, "link closed");
}

/// Warm a freshly-registered drone's mirrors: issue a fetch for every
/// repository the hub holds, best-effort.
fn spawn_catch_up(state: AppState, handle: DroneLink) {
    tokio::spawn(async move {
        let repo_dir = state.config().repo_dir();
        let mut repos = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&repo_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                if let Some(repo) = name.to_string_lossy().strip_suffix(".git") {
                    repos.push(repo.to_string());
                }
            }
        }

        let timeout = state.config().call_timeout;
        for repo in repos {
            let call = handle
                .call(DroneCommand::Fetch { repo: repo.clone() }, timeout)
                .await;
            match call {
                Ok(CommandReply::Fetch { error: None }) => {
                    debug!(drone_id = %handle.id, repo = %repo, "catch-up fetch done");
                }
                Ok(CommandReply::Fetch { error: Some(e) }) => {
                    warn!(drone_id = %handle.id, repo = %repo, error = %e, "catch-up fetch failed");
                }
                Ok(other) => {
                    warn!(drone_id = %handle.id, repo = %repo, reply = ?other, "unexpected catch-up reply");
                }
                Err(e) => {
                    warn!(drone_id = %handle.id, repo = %repo, error = %e, "catch-up fetch failed");
                }
            }
        }
    });
}

/// Read the next decodable drone frame, skipping non-text traffic. `None`
/// means the socket is gone.
async fn recv_frame(stream: &mut SplitStream<WebSocket>) -> Option<DroneFrame> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    warn!(error = %e, "dropping malformed drone frame");
                }
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &HubFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}
