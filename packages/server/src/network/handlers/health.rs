//! Health, liveness, and readiness endpoint handlers.
//!
//! These handlers expose server health information for orchestrators
//! (Kubernetes, load balancers) and operational monitoring (spec §4.8,
//! §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Returns `{status, clients, channels, uptime, version}` as JSON.
///
/// Always returns 200 -- the `status` field indicates whether the server
/// is actually healthy, distinguishing "up but draining" from "down" for
/// monitoring tools.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.shutdown.health_state();

    Json(json!({
        "status": status.as_str(),
        "clients": state.hub.client_count(),
        "channels": state.hub.channel_count(),
        "uptime": state.hub.uptime().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Kubernetes liveness probe -- always returns 200 OK.
///
/// Only checks whether the process is running and responsive; a failed
/// liveness probe triggers a pod restart, so it intentionally ignores
/// downstream health state.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe -- returns 200 when ready, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
