//! Link manager: direct peers, the server map, and flood routing.

use std::collections::HashSet;

use corvus_proto::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::LinkBlock;
use crate::state::{Sid, Uid};

/// A remote server in the network map.
#[derive(Debug, Clone)]
pub struct ServerNode {
    pub sid: Sid,
    pub name: String,
    pub description: String,
    /// Hops from us; direct neighbors are 1.
    pub hop: u32,
    /// The direct neighbor this server was learned from; `None` when the
    /// server is itself a direct neighbor.
    pub learned_from: Option<Sid>,
    pub linked_at: i64,
    /// UIDs introduced by or behind this server.
    pub uids: HashSet<Uid>,
}

impl ServerNode {
    pub fn is_direct(&self) -> bool {
        self.learned_from.is_none()
    }
}

/// Outbound handle for a direct neighbor.
#[derive(Clone)]
pub struct PeerHandle {
    pub sid: Sid,
    pub name: String,
    pub tx: mpsc::Sender<Message>,
}

/// Tracks direct links and the full server map.
pub struct LinkManager {
    my_sid: Sid,
    pub my_name: String,
    /// Direct neighbors by SID.
    peers: DashMap<Sid, PeerHandle>,
    /// Every known remote server by SID (direct and behind).
    servers: DashMap<Sid, ServerNode>,
    /// Configured link blocks.
    pub link_blocks: Vec<LinkBlock>,
}

impl LinkManager {
    pub fn new(my_sid: Sid, my_name: String, link_blocks: Vec<LinkBlock>) -> Self {
        Self {
            my_sid,
            my_name,
            peers: DashMap::new(),
            servers: DashMap::new(),
            link_blocks,
        }
    }

    pub fn my_sid(&self) -> &str {
        &self.my_sid
    }

    /// Register a direct neighbor after a successful handshake.
    pub fn register_peer(&self, sid: &str, name: &str, description: &str, tx: mpsc::Sender<Message>) {
        self.peers.insert(
            sid.to_string(),
            PeerHandle {
                sid: sid.to_string(),
                name: name.to_string(),
                tx,
            },
        );
        self.servers.insert(
            sid.to_string(),
            ServerNode {
                sid: sid.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                hop: 1,
                learned_from: None,
                linked_at: chrono::Utc::now().timestamp(),
                uids: HashSet::new(),
            },
        );
    }

    /// Record a server learned from a neighbor's burst.
    pub fn add_remote_server(
        &self,
        sid: &str,
        name: &str,
        description: &str,
        hop: u32,
        learned_from: &str,
    ) {
        self.servers.insert(
            sid.to_string(),
            ServerNode {
                sid: sid.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                hop,
                learned_from: Some(learned_from.to_string()),
                linked_at: chrono::Utc::now().timestamp(),
                uids: HashSet::new(),
            },
        );
    }

    pub fn peer(&self, sid: &str) -> Option<PeerHandle> {
        self.peers.get(sid).map(|p| p.value().clone())
    }

    pub fn server(&self, sid: &str) -> Option<ServerNode> {
        self.servers.get(sid).map(|s| s.value().clone())
    }

    pub fn server_by_name(&self, name: &str) -> Option<ServerNode> {
        self.servers
            .iter()
            .find(|e| e.value().name.eq_ignore_ascii_case(name))
            .map(|e| e.value().clone())
    }

    pub fn direct_links(&self) -> Vec<PeerHandle> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn all_servers(&self) -> Vec<ServerNode> {
        self.servers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn is_linked(&self, name: &str) -> bool {
        self.server_by_name(name).is_some()
    }

    /// The SID that owns a UID (its 3-character prefix).
    pub fn sid_of_uid(uid: &str) -> Option<&str> {
        uid.get(0..3)
    }

    /// Record a UID as living behind a server.
    pub fn add_uid(&self, uid: &str) {
        if let Some(sid) = Self::sid_of_uid(uid) {
            if let Some(mut server) = self.servers.get_mut(sid) {
                server.uids.insert(uid.to_string());
            }
        }
    }

    pub fn remove_uid(&self, uid: &str) {
        if let Some(sid) = Self::sid_of_uid(uid) {
            if let Some(mut server) = self.servers.get_mut(sid) {
                server.uids.remove(uid);
            }
        }
    }

    /// The direct neighbor through which a SID is reached.
    pub fn route_root(&self, sid: &str) -> Option<Sid> {
        let mut current = sid.to_string();
        // Bounded walk; the map is a tree rooted at our direct links.
        for _ in 0..16 {
            let node = self.servers.get(&current)?;
            match &node.learned_from {
                None => return Some(current.clone()),
                Some(parent) => {
                    let parent = parent.clone();
                    drop(node);
                    current = parent;
                }
            }
        }
        None
    }

    /// Send to the neighbor that owns the given SID.
    pub async fn send_to_sid(&self, sid: &str, msg: Message) {
        let Some(root) = self.route_root(sid) else {
            debug!(sid = %sid, "No route to server");
            return;
        };
        if let Some(peer) = self.peer(&root) {
            if peer.tx.send(msg).await.is_err() {
                warn!(sid = %root, "Peer channel closed");
            }
        }
    }

    /// Route a message toward the server owning a UID.
    pub async fn send_to_uid_owner(&self, uid: &str, msg: Message) {
        if let Some(sid) = Self::sid_of_uid(uid) {
            self.send_to_sid(sid, msg).await;
        }
    }

    /// Flood a message to every direct link except the one it arrived on.
    pub async fn broadcast(&self, msg: &Message, except_sid: Option<&str>) {
        for peer in self.direct_links() {
            if Some(peer.sid.as_str()) == except_sid {
                continue;
            }
            if peer.tx.send(msg.clone()).await.is_err() {
                warn!(sid = %peer.sid, "Peer channel closed during broadcast");
            }
        }
    }

    /// Remove a direct neighbor and everything behind it.
    ///
    /// Returns the removed servers and the UIDs that must be quit.
    pub fn remove_cascade(&self, sid: &str) -> (Vec<ServerNode>, Vec<Uid>) {
        self.peers.remove(sid);

        // Collect the subtree rooted at `sid`.
        let mut doomed: Vec<Sid> = vec![sid.to_string()];
        let mut changed = true;
        while changed {
            changed = false;
            for entry in self.servers.iter() {
                let node = entry.value();
                if doomed.contains(&node.sid) {
                    continue;
                }
                if let Some(parent) = &node.learned_from {
                    if doomed.contains(parent) {
                        doomed.push(node.sid.clone());
                        changed = true;
                    }
                }
            }
        }

        let mut removed_servers = Vec::new();
        let mut removed_uids = Vec::new();
        for sid in doomed {
            if let Some((_, node)) = self.servers.remove(&sid) {
                removed_uids.extend(node.uids.iter().cloned());
                removed_servers.push(node);
            }
        }
        (removed_servers, removed_uids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LinkManager {
        LinkManager::new("001".to_string(), "irc.test".to_string(), Vec::new())
    }

    fn channel() -> mpsc::Sender<Message> {
        mpsc::channel(8).0
    }

    #[test]
    fn uid_prefix_is_sid() {
        assert_eq!(LinkManager::sid_of_uid("042AAAABA"), Some("042"));
        assert_eq!(LinkManager::sid_of_uid("xy"), None);
    }

    #[test]
    fn route_walks_to_direct_link() {
        let m = manager();
        m.register_peer("042", "hub.test", "hub", channel());
        m.add_remote_server("043", "leaf.test", "leaf", 2, "042");
        m.add_remote_server("044", "deep.test", "deep", 3, "043");

        assert_eq!(m.route_root("042").as_deref(), Some("042"));
        assert_eq!(m.route_root("044").as_deref(), Some("042"));
        assert_eq!(m.route_root("099"), None);
    }

    #[test]
    fn cascade_removes_subtree() {
        let m = manager();
        m.register_peer("042", "hub.test", "hub", channel());
        m.add_remote_server("043", "leaf.test", "leaf", 2, "042");
        m.register_peer("050", "other.test", "other", channel());
        m.add_uid("042AAAABA");
        m.add_uid("043AAAABA");
        m.add_uid("050AAAABA");

        let (servers, uids) = m.remove_cascade("042");
        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"hub.test"));
        assert!(names.contains(&"leaf.test"));
        assert_eq!(servers.len(), 2);
        assert_eq!(uids.len(), 2);
        assert!(!uids.contains(&"050AAAABA".to_string()));

        // The other branch survives.
        assert!(m.server("050").is_some());
        assert!(m.server("042").is_none());
    }

    #[test]
    fn server_lookup_by_name_is_case_insensitive() {
        let m = manager();
        m.register_peer("042", "Hub.Test", "hub", channel());
        assert!(m.server_by_name("hub.test").is_some());
        assert!(m.is_linked("HUB.TEST"));
    }
}
