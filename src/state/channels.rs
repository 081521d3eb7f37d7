//! Channel index management.

use std::collections::HashSet;
use std::sync::Arc;

use corvus_proto::irc_to_lower;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::state::{Channel, StatsTracker};

/// The channel index, keyed by lowercase name.
pub struct ChannelManager {
    pub channels: DashMap<String, Arc<RwLock<Channel>>>,
    /// Names with a persistent ChanServ registration (lowercase).
    registered: parking_lot::RwLock<HashSet<String>>,
    stats: Arc<StatsTracker>,
}

impl ChannelManager {
    pub fn new(registered_names: Vec<String>, stats: Arc<StatsTracker>) -> Self {
        Self {
            channels: DashMap::new(),
            registered: parking_lot::RwLock::new(
                registered_names.into_iter().map(|n| irc_to_lower(&n)).collect(),
            ),
            stats,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<RwLock<Channel>>> {
        self.channels.get(&irc_to_lower(name)).map(|c| c.value().clone())
    }

    /// Fetch or create a channel. Returns the record and whether it was
    /// created by this call.
    pub fn get_or_create(&self, name: &str) -> (Arc<RwLock<Channel>>, bool) {
        let key = irc_to_lower(name);
        if let Some(existing) = self.channels.get(&key) {
            return (existing.value().clone(), false);
        }
        let mut created = false;
        let arc = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                let mut channel = Channel::new(name);
                channel.registered = self.registered.read().contains(&key);
                Arc::new(RwLock::new(channel))
            })
            .value()
            .clone();
        if created {
            self.stats.channel_created();
        }
        (arc, created)
    }

    /// Remove the channel if it has no members and no registration holds
    /// it alive. Returns whether it was removed.
    pub async fn remove_if_empty(&self, name: &str) -> bool {
        let key = irc_to_lower(name);
        let Some(arc) = self.get(&key) else {
            return false;
        };
        {
            let channel = arc.read().await;
            if channel.member_count() > 0 || !channel.removable_when_empty() {
                return false;
            }
        }
        if self.channels.remove(&key).is_some() {
            self.stats.channel_destroyed();
            true
        } else {
            false
        }
    }

    /// Mark a name registered (ChanServ REGISTER) or drop it.
    pub async fn set_registered(&self, name: &str, registered: bool) {
        let key = irc_to_lower(name);
        {
            let mut set = self.registered.write();
            if registered {
                set.insert(key.clone());
            } else {
                set.remove(&key);
            }
        }
        if let Some(arc) = self.get(&key) {
            arc.write().await.registered = registered;
        }
        if !registered {
            self.remove_if_empty(&key).await;
        }
    }

    /// Snapshot of the channel names (lowercase).
    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemberModes;

    fn manager() -> ChannelManager {
        ChannelManager::new(vec!["#kept".to_string()], Arc::new(StatsTracker::new()))
    }

    #[tokio::test]
    async fn create_and_lookup_case_insensitive() {
        let m = manager();
        let (_, created) = m.get_or_create("#Rust");
        assert!(created);
        let (_, created) = m.get_or_create("#rust");
        assert!(!created);
        assert!(m.get("#RUST").is_some());
    }

    #[tokio::test]
    async fn empty_channel_removed() {
        let m = manager();
        let (chan, _) = m.get_or_create("#temp");
        {
            let mut chan = chan.write().await;
            chan.add_member("001AAAABA", "alice", MemberModes::op());
            chan.remove_member("001AAAABA");
        }
        assert!(m.remove_if_empty("#temp").await);
        assert!(m.get("#temp").is_none());
    }

    #[tokio::test]
    async fn registered_channel_survives_empty() {
        let m = manager();
        let (chan, _) = m.get_or_create("#kept");
        assert!(chan.read().await.registered);
        assert!(!m.remove_if_empty("#kept").await);
        assert!(m.get("#kept").is_some());

        m.set_registered("#kept", false).await;
        assert!(m.get("#kept").is_none());
    }

    #[tokio::test]
    async fn occupied_channel_not_removed() {
        let m = manager();
        let (chan, _) = m.get_or_create("#busy");
        chan.write()
            .await
            .add_member("001AAAABA", "alice", MemberModes::default());
        assert!(!m.remove_if_empty("#busy").await);
    }
}
