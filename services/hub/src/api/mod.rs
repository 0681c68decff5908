//! HTTP surface: control API routing, auth, and the drone link endpoint.

pub mod error;
mod v1;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::link;
use crate::state::AppState;

use error::ApiError;

/// Build the hub's full router: health, control API, and the drone link.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/v1", v1::routes().merge(link::routes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    timestamp: String,
    drones: usize,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "hub".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        drones: state.registry().list().len(),
    })
}

/// Check the request's bearer token against the hub secret.
///
/// Plain equality against one shared secret; there are no scopes or users.
fn require_bearer(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(token) if token == state.config().secret => Ok(()),
        Some(_) => Err(ApiError::unauthorized("bad_token", "bearer token mismatch")),
        None => Err(ApiError::unauthorized(
            "missing_token",
            "Authorization: Bearer header required",
        )),
    }
}
