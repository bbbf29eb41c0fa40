//! WebSocket upgrade handler: hands each accepted connection off to the
//! Session Loop (spec §4.5).

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use crate::session::run_session;

use super::AppState;

/// Upgrades an HTTP connection to a WebSocket connection and spawns its
/// Session Loop. The remote address and user agent are captured here,
/// once, at handshake time (spec §3: "read-only thereafter").
pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| async move {
        run_session(
            socket,
            state.hub,
            state.verifier,
            state.handler_bridge,
            state.shutdown,
            Some(remote_addr.to_string()),
            user_agent,
        )
        .await;
    })
}
