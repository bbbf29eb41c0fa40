//! Hub: root of the object graph, holding the client and channel
//! registries (spec §4.4).
//!
//! The hub lock protects only the top-level `DashMap`s; all per-client
//! and per-channel mutation goes through their own finer-grained locks,
//! and nothing here holds a lock across I/O (spec §5).

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::broadcast::{self, BroadcastTemplate};
use crate::channel::ChannelRegistry;
use crate::client::{ClientId, ClientIdAllocator, ClientRecord, OutboundMessage};
use crate::network::config::ConnectionConfig;

/// Error returned when an admin operation targets a client that no
/// longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client not found")]
pub struct ClientNotFound;

/// Root object graph: client registry, channel registry, and the
/// configuration that parameterizes per-connection deadlines.
pub struct Hub {
    clients: DashMap<ClientId, Arc<ClientRecord>>,
    channels: ChannelRegistry,
    id_allocator: ClientIdAllocator,
    connection_config: ConnectionConfig,
    start_time: Instant,
}

impl Hub {
    #[must_use]
    pub fn new(connection_config: ConnectionConfig) -> Self {
        Self {
            clients: DashMap::new(),
            channels: ChannelRegistry::new(),
            id_allocator: ClientIdAllocator::new(),
            connection_config,
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    #[must_use]
    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.connection_config
    }

    #[must_use]
    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Registers a new connection, returning its record and the receiver
    /// end of its send lane (handed to the session loop's writer task).
    pub fn register(
        &self,
        remote_addr: Option<String>,
        user_agent: Option<String>,
    ) -> (Arc<ClientRecord>, mpsc::Receiver<OutboundMessage>) {
        let id = self.id_allocator.next();
        let (record, rx) = ClientRecord::new(id, remote_addr, user_agent, &self.connection_config);
        let record = Arc::new(record);
        self.clients.insert(id, record.clone());
        metrics::gauge!("hub_clients_total").set(self.clients.len() as f64);
        info!(client_id = %id, "client registered");
        (record, rx)
    }

    /// Deregisters `id`: removes it from the client map and sweeps it
    /// from every channel it had joined (spec §4.4, §5 graceful close).
    /// Idempotent.
    pub fn deregister(&self, id: ClientId) -> Option<Arc<ClientRecord>> {
        let removed = self.clients.remove(&id).map(|(_, record)| record);
        self.channels.remove_member_everywhere(id);
        if let Some(record) = &removed {
            record.close();
            metrics::gauge!("hub_clients_total").set(self.clients.len() as f64);
            info!(client_id = %id, "client deregistered");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: ClientId) -> Option<Arc<ClientRecord>> {
        self.clients.get(&id).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.list().len()
    }

    /// Snapshot of every registered client, used by the admin surface's
    /// `list-clients`. Released before any I/O.
    #[must_use]
    pub fn all_clients(&self) -> Vec<Arc<ClientRecord>> {
        self.clients.iter().map(|entry| entry.clone()).collect()
    }

    /// Sends `kicked` then closes the connection. Returns
    /// [`ClientNotFound`] if `id` is not registered (spec §6: 404).
    ///
    /// # Errors
    ///
    /// [`ClientNotFound`] if `id` is not currently registered.
    pub fn kick(&self, id: ClientId, reason: &str) -> Result<(), ClientNotFound> {
        let client = self.get(id).ok_or(ClientNotFound)?;
        let frame = crate::session::frames::ServerFrame::new(
            id,
            "kicked",
            serde_json::json!({"reason": reason}),
        );
        let _ = client.try_send(OutboundMessage::Frame(frame));
        let _ = client.try_send(OutboundMessage::Close);
        self.deregister(id);
        Ok(())
    }

    /// Sends a single pre-built frame to `id`.
    ///
    /// # Errors
    ///
    /// [`ClientNotFound`] if `id` is not registered.
    pub fn send_to_client(
        &self,
        id: ClientId,
        frame: crate::session::frames::ServerFrame,
    ) -> Result<(), ClientNotFound> {
        let client = self.get(id).ok_or(ClientNotFound)?;
        let _ = client.try_send(OutboundMessage::Frame(frame));
        Ok(())
    }

    async fn dispatch(&self, recipients: Vec<Arc<ClientRecord>>, template: BroadcastTemplate) {
        let evicted = broadcast::fan_out(recipients, template, &self.connection_config).await;
        for id in evicted {
            self.deregister(id);
        }
    }

    /// Broadcasts to every member of `channel`. A missing channel is a
    /// no-op (spec §4.6: "missing channel is a no-op with a warning").
    pub async fn broadcast_to_channel(&self, channel: &str, template: BroadcastTemplate) {
        let Some(ch) = self.channels.lookup(channel) else {
            warn!(%channel, "broadcast to unknown channel");
            return;
        };
        let recipients: Vec<_> = ch
            .members_snapshot()
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect();
        self.dispatch(recipients, template.with_channel(channel))
            .await;
    }

    /// Broadcasts to every registered client.
    pub async fn broadcast_to_all(&self, template: BroadcastTemplate) {
        self.dispatch(self.all_clients(), template).await;
    }

    /// Broadcasts to every client with a non-empty authenticated identity.
    pub async fn broadcast_to_authenticated(&self, template: BroadcastTemplate) {
        let recipients: Vec<_> = self
            .all_clients()
            .into_iter()
            .filter(|c| c.user_id().is_some())
            .collect();
        self.dispatch(recipients, template).await;
    }

    /// Broadcasts to every connection sharing `user_id` (multi-device
    /// fan-out).
    pub async fn broadcast_to_user(&self, user_id: &str, template: BroadcastTemplate) {
        let recipients: Vec<_> = self
            .all_clients()
            .into_iter()
            .filter(|c| c.user_id().as_deref() == Some(user_id))
            .collect();
        self.dispatch(recipients, template).await;
    }

    /// Broadcasts to every authenticated client except `user_id`.
    pub async fn broadcast_to_users_except(&self, user_id: &str, template: BroadcastTemplate) {
        let recipients: Vec<_> = self
            .all_clients()
            .into_iter()
            .filter(|c| matches!(c.user_id(), Some(uid) if uid != user_id))
            .collect();
        self.dispatch(recipients, template).await;
    }
}
