//! Identity claims carried by a verified bearer token.

use serde::{Deserialize, Serialize};

/// Identity extracted from a successfully verified token.
///
/// Populated on the wire as `{user_id, username, email}` inside server
/// frames and the handler payload's `auth` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub user_id: String,
    pub username: String,
    pub email: String,
    /// Unix timestamp (seconds) after which the token is no longer valid.
    pub exp: u64,
}
