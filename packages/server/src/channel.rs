//! Channel Registry: named multicast groups, created lazily, never
//! garbage-collected on membership reaching zero (spec §3).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::client::ClientId;

/// A named multicast group. Borrows members by id; does not own clients
/// (spec §9: channels borrow, clients store names).
pub struct Channel {
    pub name: String,
    pub require_auth: bool,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    members: RwLock<HashSet<ClientId>>,
}

impl Channel {
    #[must_use]
    fn new(name: String) -> Self {
        Self {
            name,
            require_auth: false,
            private: false,
            created_at: Utc::now(),
            members: RwLock::new(HashSet::new()),
        }
    }

    pub fn add_member(&self, id: ClientId) {
        self.members.write().insert(id);
    }

    pub fn remove_member(&self, id: ClientId) -> bool {
        self.members.write().remove(&id)
    }

    /// A defensive snapshot: callers iterate this, never the live set, so
    /// broadcasts are safe against concurrent membership changes (spec
    /// §4.3).
    #[must_use]
    pub fn members_snapshot(&self) -> Vec<ClientId> {
        self.members.read().iter().copied().collect()
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    #[must_use]
    pub fn is_member(&self, id: ClientId) -> bool {
        self.members.read().contains(&id)
    }
}

/// Thread-safe registry of all channels, keyed by name.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, std::sync::Arc<Channel>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel, creating it with default policy flags if it
    /// does not exist yet.
    #[must_use]
    pub fn get_or_create(&self, name: &str) -> std::sync::Arc<Channel> {
        if let Some(existing) = self.channels.get(name) {
            return existing.clone();
        }
        let channel = std::sync::Arc::new(Channel::new(name.to_string()));
        self.channels
            .entry(name.to_string())
            .or_insert(channel)
            .clone()
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<std::sync::Arc<Channel>> {
        self.channels.get(name).map(|entry| entry.clone())
    }

    /// Creates (if absent) or updates the policy flags of a channel. Admin
    /// surface only -- the client wire protocol never sets policy (spec
    /// §9).
    pub fn configure(&self, name: &str, require_auth: Option<bool>, private: Option<bool>) {
        let existing = self.lookup(name);
        let channel = existing.unwrap_or_else(|| self.get_or_create(name));
        let replacement = Channel {
            name: channel.name.clone(),
            require_auth: require_auth.unwrap_or(channel.require_auth),
            private: private.unwrap_or(channel.private),
            created_at: channel.created_at,
            members: RwLock::new(channel.members.read().clone()),
        };
        self.channels
            .insert(name.to_string(), std::sync::Arc::new(replacement));
    }

    /// Removes `id` from every channel it belongs to. Used by the hub
    /// during client deregistration.
    pub fn remove_member_everywhere(&self, id: ClientId) {
        for entry in self.channels.iter() {
            entry.value().remove_member(id);
        }
    }

    /// Enumerates channel names and member counts only -- never holds a
    /// lock across I/O (spec §4.3).
    #[must_use]
    pub fn list(&self) -> Vec<(String, usize, bool, bool, DateTime<Utc>)> {
        self.channels
            .iter()
            .map(|entry| {
                let ch = entry.value();
                (
                    ch.name.clone(),
                    ch.member_count(),
                    ch.private,
                    ch.require_auth,
                    ch.created_at,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_lazy_and_idempotent() {
        let registry = ChannelRegistry::new();
        assert!(registry.lookup("room1").is_none());

        let a = registry.get_or_create("room1");
        let b = registry.get_or_create("room1");
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn add_and_remove_member() {
        let registry = ChannelRegistry::new();
        let channel = registry.get_or_create("room1");
        channel.add_member(ClientId(1));
        assert!(channel.is_member(ClientId(1)));
        assert_eq!(channel.member_count(), 1);

        assert!(channel.remove_member(ClientId(1)));
        assert!(!channel.is_member(ClientId(1)));
    }

    #[test]
    fn channel_persists_after_last_member_leaves() {
        let registry = ChannelRegistry::new();
        let channel = registry.get_or_create("room1");
        channel.add_member(ClientId(1));
        channel.remove_member(ClientId(1));

        assert!(registry.lookup("room1").is_some());
    }

    #[test]
    fn configure_sets_require_auth_and_private() {
        let registry = ChannelRegistry::new();
        registry.configure("secret", Some(true), Some(true));
        let channel = registry.lookup("secret").unwrap();
        assert!(channel.require_auth);
        assert!(channel.private);
    }

    #[test]
    fn configure_preserves_existing_members() {
        let registry = ChannelRegistry::new();
        let channel = registry.get_or_create("room1");
        channel.add_member(ClientId(1));

        registry.configure("room1", Some(true), None);
        let updated = registry.lookup("room1").unwrap();
        assert!(updated.is_member(ClientId(1)));
        assert!(updated.require_auth);
    }

    #[test]
    fn remove_member_everywhere_sweeps_all_channels() {
        let registry = ChannelRegistry::new();
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");
        a.add_member(ClientId(1));
        b.add_member(ClientId(1));

        registry.remove_member_everywhere(ClientId(1));
        assert!(!a.is_member(ClientId(1)));
        assert!(!b.is_member(ClientId(1)));
    }

    #[test]
    fn list_returns_name_and_count_only() {
        let registry = ChannelRegistry::new();
        let channel = registry.get_or_create("room1");
        channel.add_member(ClientId(1));
        channel.add_member(ClientId(2));

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].0, "room1");
        assert_eq!(list[0].1, 2);
    }
}
