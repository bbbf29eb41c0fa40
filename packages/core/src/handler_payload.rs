//! Normalized payload handed off to the external handler process.
//!
//! Shape is part of the handler's external contract (spec §3, §6) and
//! MUST stay stable across releases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity fields forwarded to the handler, present even when the
/// originating client was never authenticated (all fields empty in that
/// case).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The event data nested inside a [`HandlerPayload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub event: String,
    pub payload: serde_json::Value,
    pub original_timestamp: DateTime<Utc>,
}

/// `{message-id, timestamp, action, auth, data}` -- the object written to
/// the payload file for the handler process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerPayload {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub auth: HandlerAuth,
    pub data: HandlerData,
}
