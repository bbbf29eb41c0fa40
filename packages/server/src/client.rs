//! Client Record: per-connection state owned by exactly one Session Loop.
//!
//! Mirrors the shape of the teacher's `ConnectionHandle`/`ConnectionRegistry`
//! pair in `network/connection.rs`, generalized from a single `kind`-keyed
//! broadcast to authenticated identity, channel membership, and the
//! liveness state machine the spec requires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::network::config::ConnectionConfig;
use crate::session::frames::ServerFrame;

/// Opaque, server-assigned, per-connection identifier. Never reused across
/// reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic liveness state: `Alive` -> `Closing` -> `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Closing,
    Closed,
}

/// Populated only after a successful token verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

/// Per-membership metadata stored alongside the channel name.
#[derive(Debug, Clone)]
pub struct Membership {
    pub joined_at: DateTime<Utc>,
    pub data: Value,
}

/// Message enqueued onto a client's send lane. The lane is the only path
/// permitted to write to the transport (spec §3 invariant), so transport
/// pings share it with application frames rather than bypassing it.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Frame(ServerFrame),
    Ping,
    Close,
}

/// Failure reasons for a send onto a client's lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Liveness is not `Alive`.
    Closed,
    /// The lane is at capacity (overflow -- caller should evict).
    Full,
    /// `send_timeout` did not complete before the deadline.
    Timeout,
}

/// Error returned by [`ClientRecord::set_identity`] when a second
/// authentication would silently reassign identity to a different user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMismatch;

struct ClientState {
    liveness: Liveness,
    identity: Option<Identity>,
    memberships: HashMap<String, Membership>,
    last_activity: Instant,
}

/// Per-connection record. Exactly one exists per live connection; it is
/// created when the handshake completes and destroyed exactly once when
/// the owning Session Loop exits.
pub struct ClientRecord {
    pub id: ClientId,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<OutboundMessage>,
    state: RwLock<ClientState>,
}

impl ClientRecord {
    #[must_use]
    pub fn new(
        id: ClientId,
        remote_addr: Option<String>,
        user_agent: Option<String>,
        config: &ConnectionConfig,
    ) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(config.outbound_channel_capacity);
        let record = Self {
            id,
            remote_addr,
            user_agent,
            connected_at: Utc::now(),
            tx,
            state: RwLock::new(ClientState {
                liveness: Liveness::Alive,
                identity: None,
                memberships: HashMap::new(),
                last_activity: Instant::now(),
            }),
        };
        (record, rx)
    }

    /// Enqueues a frame onto the send lane without blocking.
    ///
    /// # Errors
    ///
    /// [`SendError::Closed`] if liveness is not `Alive`; [`SendError::Full`]
    /// if the lane is at capacity.
    pub fn try_send(&self, msg: OutboundMessage) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::Closed);
        }
        self.tx.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Enqueues a frame, waiting up to `timeout` for lane capacity. Used by
    /// the Broadcast Engine, which measures this call's latency per
    /// recipient (spec §4.6).
    ///
    /// # Errors
    ///
    /// As [`try_send`](Self::try_send), plus [`SendError::Timeout`].
    pub async fn send_timeout(
        &self,
        msg: OutboundMessage,
        timeout: Duration,
    ) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::Closed);
        }
        match tokio::time::timeout(timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => Err(SendError::Timeout),
        }
    }

    /// Sets the authenticated identity. Idempotent for the same user id;
    /// rejects reassignment to a different user id mid-session (spec §9
    /// open question, resolved: identity is monotonic).
    ///
    /// # Errors
    ///
    /// [`IdentityMismatch`] if an identity is already set for a different
    /// user id.
    pub fn set_identity(&self, identity: Identity) -> Result<(), IdentityMismatch> {
        let mut state = self.state.write();
        match &state.identity {
            Some(existing) if existing.user_id != identity.user_id => Err(IdentityMismatch),
            _ => {
                state.identity = Some(identity);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state.read().identity.clone()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.state.read().identity.as_ref().map(|i| i.user_id.clone())
    }

    /// Joins `channel`, recording `data` as the membership metadata.
    /// Replaces any prior metadata for the same channel (join/leave/join
    /// round-trip law, spec §8).
    pub fn join(&self, channel: impl Into<String>, data: Value) {
        let mut state = self.state.write();
        state.memberships.insert(
            channel.into(),
            Membership {
                joined_at: Utc::now(),
                data,
            },
        );
    }

    /// Removes the membership flag and its metadata together (spec §9:
    /// these must never be removed separately). Returns whether the
    /// client was a member.
    pub fn leave(&self, channel: &str) -> bool {
        self.state.write().memberships.remove(channel).is_some()
    }

    #[must_use]
    pub fn is_member(&self, channel: &str) -> bool {
        self.state.read().memberships.contains_key(channel)
    }

    /// Snapshot of joined channel names, used during teardown to sweep
    /// the client from every channel it belongs to.
    #[must_use]
    pub fn joined_channels(&self) -> Vec<String> {
        self.state.read().memberships.keys().cloned().collect()
    }

    pub fn touch(&self) {
        self.state.write().last_activity = Instant::now();
    }

    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.state.read().last_activity
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.read().liveness == Liveness::Alive
    }

    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.state.read().liveness
    }

    /// Transitions `Alive` -> `Closing`. No-op otherwise.
    pub fn mark_closing(&self) {
        let mut state = self.state.write();
        if state.liveness == Liveness::Alive {
            state.liveness = Liveness::Closing;
        }
    }

    /// Transitions to `Closed`. Idempotent: any number of calls have the
    /// effect of exactly one (spec §8).
    pub fn close(&self) {
        let mut state = self.state.write();
        state.liveness = Liveness::Closed;
    }
}

impl std::fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id)
            .field("liveness", &self.liveness())
            .finish_non_exhaustive()
    }
}

/// Assigns fresh, monotonically increasing client identifiers.
///
/// IDs start at 1 so `ClientId(0)` can be reserved as a sentinel.
#[derive(Debug, Default)]
pub struct ClientIdAllocator {
    next: AtomicU64,
}

impl ClientIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> ClientId {
        ClientId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_client() -> (ClientRecord, mpsc::Receiver<OutboundMessage>) {
        ClientRecord::new(ClientId(1), None, None, &ConnectionConfig::default())
    }

    #[test]
    fn new_client_starts_alive_with_no_identity() {
        let (client, _rx) = new_client();
        assert!(client.is_alive());
        assert!(client.identity().is_none());
    }

    #[test]
    fn try_send_fails_once_closed() {
        let (client, _rx) = new_client();
        client.close();
        let err = client.try_send(OutboundMessage::Close).unwrap_err();
        assert_eq!(err, SendError::Closed);
    }

    #[test]
    fn try_send_full_when_lane_saturated() {
        let config = ConnectionConfig {
            outbound_channel_capacity: 1,
            ..ConnectionConfig::default()
        };
        let (client, _rx) = ClientRecord::new(ClientId(1), None, None, &config);
        client.try_send(OutboundMessage::Close).unwrap();
        let err = client.try_send(OutboundMessage::Close).unwrap_err();
        assert_eq!(err, SendError::Full);
    }

    #[test]
    fn set_identity_idempotent_for_same_user() {
        let (client, _rx) = new_client();
        let identity = Identity {
            user_id: "u1".into(),
            username: "alice".into(),
            email: "a@example.com".into(),
        };
        client.set_identity(identity.clone()).unwrap();
        client.set_identity(identity).unwrap();
        assert_eq!(client.user_id().as_deref(), Some("u1"));
    }

    #[test]
    fn set_identity_rejects_different_user() {
        let (client, _rx) = new_client();
        client
            .set_identity(Identity {
                user_id: "u1".into(),
                username: "alice".into(),
                email: "a@example.com".into(),
            })
            .unwrap();
        let err = client
            .set_identity(Identity {
                user_id: "u2".into(),
                username: "bob".into(),
                email: "b@example.com".into(),
            })
            .unwrap_err();
        assert_eq!(err, IdentityMismatch);
        assert_eq!(client.user_id().as_deref(), Some("u1"));
    }

    #[test]
    fn join_then_leave_then_join_replaces_metadata() {
        let (client, _rx) = new_client();
        client.join("room1", json!({"v": 1}));
        assert!(client.is_member("room1"));
        assert!(client.leave("room1"));
        assert!(!client.is_member("room1"));

        client.join("room1", json!({"v": 2}));
        assert!(client.is_member("room1"));
        assert_eq!(client.joined_channels(), vec!["room1".to_string()]);
    }

    #[test]
    fn close_is_idempotent() {
        let (client, _rx) = new_client();
        client.close();
        client.close();
        assert_eq!(client.liveness(), Liveness::Closed);
    }

    #[test]
    fn mark_closing_does_not_override_closed() {
        let (client, _rx) = new_client();
        client.close();
        client.mark_closing();
        assert_eq!(client.liveness(), Liveness::Closed);
    }

    #[test]
    fn client_id_allocator_is_monotonic_and_starts_at_one() {
        let allocator = ClientIdAllocator::new();
        assert_eq!(allocator.next(), ClientId(1));
        assert_eq!(allocator.next(), ClientId(2));
    }

    #[tokio::test]
    async fn send_timeout_succeeds_with_capacity() {
        let (client, _rx) = new_client();
        let result = client
            .send_timeout(OutboundMessage::Close, Duration::from_millis(100))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn send_timeout_times_out_when_lane_full_and_unread() {
        let config = ConnectionConfig {
            outbound_channel_capacity: 1,
            ..ConnectionConfig::default()
        };
        let (client, _rx) = ClientRecord::new(ClientId(1), None, None, &config);
        client.try_send(OutboundMessage::Close).unwrap();

        let result = client
            .send_timeout(OutboundMessage::Close, Duration::from_millis(20))
            .await;
        assert_eq!(result.unwrap_err(), SendError::Timeout);
    }
}
