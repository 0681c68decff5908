//! Control API v1 handlers.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::SinkExt;
use gitfleet_wire::{
    DeployParams, DeployResponse, DroneSummary, ListDronesResponse, Selector, SpawnParams,
    SpawnResponse, StopParams, StopResponse,
};
use serde::Deserialize;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::require_bearer;
use crate::dispatch;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/drones", get(list_drones))
        .route("/deploy", post(deploy))
        .route("/spawn", post(spawn))
        .route("/stop", post(stop))
        .route("/ps", get(ps))
        .route("/hooks/push/{repo}", post(push_hook))
}

async fn list_drones(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<ListDronesResponse>, ApiError> {
    require_bearer(&headers, &state)?;
    let drones = state
        .registry()
        .list()
        .into_iter()
        .map(|d| DroneSummary {
            id: d.id,
            addr: d.addr,
        })
        .collect();
    Ok(Json(ListDronesResponse { drones }))
}

async fn deploy(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(params): Json<DeployParams>,
) -> Result<Json<DeployResponse>, ApiError> {
    require_bearer(&headers, &state)?;
    info!(repo = %params.repo, commit = %params.commit, "deploy requested");
    let failures = dispatch::deploy(&state, &params.selector, &params.repo, &params.commit).await;
    Ok(Json(DeployResponse { failures }))
}

async fn spawn(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(params): Json<SpawnParams>,
) -> Result<Json<SpawnResponse>, ApiError> {
    require_bearer(&headers, &state)?;
    if params.spawn.command.is_empty() {
        return Err(ApiError::bad_request("empty_command", "command is required"));
    }
    info!(
        repo = %params.spawn.repo,
        commit = %params.spawn.commit,
        count = params.spawn.count,
        "spawn requested"
    );
    let procs = dispatch::spawn(&state, &params.selector, &params.spawn).await;
    Ok(Json(SpawnResponse { procs }))
}

async fn stop(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(params): Json<StopParams>,
) -> Result<Json<StopResponse>, ApiError> {
    require_bearer(&headers, &state)?;
    let procs = dispatch::stop(&state, &params.selector, &params.target).await;
    Ok(Json(StopResponse { procs }))
}

#[derive(Debug, Deserialize)]
struct PsQuery {
    /// Comma-separated drone ids; absent means the whole fleet.
    drones: Option<String>,
}

async fn ps(
    headers: HeaderMap,
    Query(query): Query<PsQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    require_bearer(&headers, &state)?;
    let selector = match query.drones {
        Some(names) => Selector::Named {
            names: names.split(',').map(str::to_string).collect(),
        },
        None => Selector::All,
    };
    Ok(ws
        .on_upgrade(move |socket| stream_ps(socket, state, selector))
        .into_response())
}

async fn stream_ps(mut socket: WebSocket, state: AppState, selector: Selector) {
    let mut events = dispatch::ps(&state, &selector);
    while let Some(event) = events.recv().await {
        let Ok(text) = serde_json::to_string(&event) else {
            continue;
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
    let _ = socket.close().await;
}

async fn push_hook(
    headers: HeaderMap,
    Path(repo): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    require_bearer(&headers, &state)?;
    // Repo names become path components on every drone
    if repo.is_empty() || repo.contains('/') || repo.contains("..") {
        return Err(ApiError::bad_request("bad_repo", "invalid repository name"));
    }
    info!(repo = %repo, "push received, broadcasting fetch");
    tokio::spawn(async move {
        dispatch::broadcast_fetch(&state, &repo).await;
    });
    Ok(StatusCode::ACCEPTED)
}
