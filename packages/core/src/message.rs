//! Broadcast targeting: selects which recipient set a broadcast reaches.

use serde::{Deserialize, Serialize};

/// Selects the recipient set for a broadcast (spec §4.6, §4.8).
///
/// The admin surface's `POST /broadcast` deserializes this directly from
/// the request body's `broadcast_type` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastType {
    Channel,
    Global,
    Authenticated,
    User,
    UserExcept,
    Client,
}
