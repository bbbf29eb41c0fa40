//! Admin Surface: bearer-protected operations over the hub (spec §4.8).
//!
//! Every handler here authorizes first, comparing the presented
//! credential against the configured admin token in constant time so the
//! comparison itself leaks nothing about how much of the token matched.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;

use socket_server_core::BroadcastType;

use crate::broadcast::BroadcastTemplate;
use crate::client::ClientId;
use crate::hub::Hub;

use super::AppState;

/// Failure modes for the admin surface, mapped to the status codes the
/// spec's external-interface table documents.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("missing or invalid bearer credential")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("client not found")]
    ClientNotFound,
    #[error("channel not found")]
    ChannelNotFound,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::ClientNotFound | AdminError::ChannelNotFound => StatusCode::NOT_FOUND,
        };
        let body = Json(json!({"status": "error", "message": self.to_string()}));
        (status, body).into_response()
    }
}

/// Extracts the `Authorization: Bearer <token>` header and compares it
/// against `state.admin_token` without early-exiting on a byte mismatch.
fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), AdminError> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AdminError::Unauthorized)?;

    let expected = state.admin_token.as_bytes();
    let ok: bool = presented.as_bytes().ct_eq(expected).into();
    if ok {
        Ok(())
    } else {
        Err(AdminError::Unauthorized)
    }
}

/// `GET /clients` -> `{clients:[...], total}` (spec §6).
pub async fn list_clients_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AdminError> {
    authorize(&headers, &state)?;

    let clients: Vec<_> = state
        .hub
        .all_clients()
        .into_iter()
        .map(|client| {
            let identity = client.identity();
            json!({
                "id": client.id.0,
                "user_id": identity.as_ref().map(|i| i.user_id.clone()),
                "username": identity.as_ref().map(|i| i.username.clone()),
                "remote_addr": client.remote_addr,
                "user_agent": client.user_agent,
                "connected_at": client.connected_at,
                "channels": client.joined_channels(),
            })
        })
        .collect();

    Ok(Json(json!({"clients": clients, "total": state.hub.client_count()})))
}

/// `GET /channels` -> `{name: {name, is_private, require_auth, client_count, created_at}}`.
pub async fn list_channels_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AdminError> {
    authorize(&headers, &state)?;

    let mut channels = serde_json::Map::new();
    for (name, count, private, require_auth, created_at) in state.hub.channels().list() {
        channels.insert(
            name.clone(),
            json!({
                "name": name,
                "is_private": private,
                "require_auth": require_auth,
                "client_count": count,
                "created_at": created_at,
            }),
        );
    }

    Ok(Json(serde_json::Value::Object(channels)))
}

/// `GET /channels/{name}/clients` -> `{channel, clients:[...], total}`.
pub async fn list_channel_members_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AdminError> {
    authorize(&headers, &state)?;

    let channel = state
        .hub
        .channels()
        .lookup(&name)
        .ok_or(AdminError::ChannelNotFound)?;

    let clients: Vec<_> = channel.members_snapshot().into_iter().map(|id| id.0).collect();
    let total = clients.len();

    Ok(Json(json!({"channel": name, "clients": clients, "total": total})))
}

/// `POST /clients/{id}/kick` -> `{status, message}`.
pub async fn kick_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, AdminError> {
    authorize(&headers, &state)?;

    state
        .hub
        .kick(ClientId(id), "kicked by administrator")
        .map_err(|_| AdminError::ClientNotFound)?;

    Ok(Json(json!({"status": "ok", "message": "client kicked"})))
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub broadcast_type: Option<BroadcastType>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<u64>,
}

/// `POST /broadcast` -> `{status, message, type}` (spec §4.8, §6).
///
/// `broadcast_type` selects a Broadcast Engine variant; required
/// parameters depend on the variant (user id for `user`/`user-except`,
/// client id for `client`, channel for `channel`). Defaults to
/// `channel` when a `channel` is given, else `all`.
pub async fn broadcast_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>, AdminError> {
    authorize(&headers, &state)?;

    let event = req.event.unwrap_or_else(|| "message".to_string());
    let data = req.data.unwrap_or(serde_json::Value::Null);
    let broadcast_type = req.broadcast_type.unwrap_or(if req.channel.is_some() {
        BroadcastType::Channel
    } else {
        BroadcastType::Global
    });

    let template = BroadcastTemplate::new(event, data);

    dispatch_broadcast(&state.hub, broadcast_type, req.channel, req.user_id, req.client_id, template).await?;

    let type_label = serde_json::to_value(broadcast_type).expect("BroadcastType always serializes");
    Ok(Json(
        json!({"status": "ok", "message": "broadcast dispatched", "type": type_label}),
    ))
}

async fn dispatch_broadcast(
    hub: &Arc<Hub>,
    broadcast_type: BroadcastType,
    channel: Option<String>,
    user_id: Option<String>,
    client_id: Option<u64>,
    template: BroadcastTemplate,
) -> Result<(), AdminError> {
    match broadcast_type {
        BroadcastType::Global => {
            hub.broadcast_to_all(template).await;
        }
        BroadcastType::Authenticated => {
            hub.broadcast_to_authenticated(template).await;
        }
        BroadcastType::Channel => {
            let channel = channel.ok_or_else(|| {
                AdminError::BadRequest("channel is required for broadcast_type=channel".to_string())
            })?;
            hub.broadcast_to_channel(&channel, template).await;
        }
        BroadcastType::User => {
            let user_id = user_id.ok_or_else(|| {
                AdminError::BadRequest("user_id is required for broadcast_type=user".to_string())
            })?;
            hub.broadcast_to_user(&user_id, template).await;
        }
        BroadcastType::UserExcept => {
            let user_id = user_id.ok_or_else(|| {
                AdminError::BadRequest("user_id is required for broadcast_type=user_except".to_string())
            })?;
            hub.broadcast_to_users_except(&user_id, template).await;
        }
        BroadcastType::Client => {
            let client_id = client_id.ok_or_else(|| {
                AdminError::BadRequest("client_id is required for broadcast_type=client".to_string())
            })?;
            let frame = template.to_frame(ClientId(client_id));
            hub.send_to_client(ClientId(client_id), frame)
                .map_err(|_| AdminError::ClientNotFound)?;
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ConfigureChannelRequest {
    pub name: String,
    #[serde(default)]
    pub require_auth: Option<bool>,
    #[serde(default)]
    pub private: Option<bool>,
}

/// `POST /channels` -> `{status, message}` (SPEC_FULL.md §9, admin-only
/// channel provisioning).
pub async fn configure_channel_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ConfigureChannelRequest>,
) -> Result<Json<serde_json::Value>, AdminError> {
    authorize(&headers, &state)?;

    if req.name.trim().is_empty() {
        return Err(AdminError::BadRequest("name must not be empty".to_string()));
    }

    state
        .hub
        .channels()
        .configure(&req.name, req.require_auth, req.private);

    Ok(Json(json!({"status": "ok", "message": "channel configured"})))
}
