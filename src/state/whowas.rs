//! WHOWAS history.
//!
//! A bounded ring of departed users, owned by the server state and
//! injected where needed (never process-global).

use std::collections::{HashMap, VecDeque};

use corvus_proto::irc_to_lower;
use parking_lot::Mutex;

/// An entry in the WHOWAS history for a disconnected user.
#[derive(Debug, Clone)]
pub struct WhowasEntry {
    /// Nickname, case-preserved.
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realname: String,
    /// Server they were connected to.
    pub server: String,
    /// Unix timestamp of departure.
    pub logout_at: i64,
}

/// Bounded WHOWAS store keyed by lowercase nickname.
pub struct WhowasStore {
    entries: Mutex<HashMap<String, VecDeque<WhowasEntry>>>,
    /// Entries retained per nickname.
    depth: usize,
}

impl WhowasStore {
    pub fn new(depth: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            depth: depth.max(1),
        }
    }

    /// Record a departing user.
    pub fn record(&self, entry: WhowasEntry) {
        let key = irc_to_lower(&entry.nick);
        let mut entries = self.entries.lock();
        let ring = entries.entry(key).or_default();
        ring.push_front(entry);
        ring.truncate(self.depth);
    }

    /// Most-recent-first history for a nickname, up to `count` entries.
    pub fn lookup(&self, nick: &str, count: usize) -> Vec<WhowasEntry> {
        let entries = self.entries.lock();
        entries
            .get(&irc_to_lower(nick))
            .map(|ring| ring.iter().take(count).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop entries older than `max_age_secs`.
    pub fn prune(&self, max_age_secs: i64) -> usize {
        let cutoff = chrono::Utc::now().timestamp() - max_age_secs;
        let mut entries = self.entries.lock();
        let mut removed = 0;
        entries.retain(|_, ring| {
            let before = ring.len();
            ring.retain(|e| e.logout_at >= cutoff);
            removed += before - ring.len();
            !ring.is_empty()
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(nick: &str, logout_at: i64) -> WhowasEntry {
        WhowasEntry {
            nick: nick.to_string(),
            ident: "u".to_string(),
            host: "h".to_string(),
            realname: "r".to_string(),
            server: "irc.test".to_string(),
            logout_at,
        }
    }

    #[test]
    fn records_most_recent_first() {
        let store = WhowasStore::new(4);
        store.record(entry("alice", 1));
        store.record(entry("alice", 2));
        let found = store.lookup("ALICE", 10);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].logout_at, 2);
    }

    #[test]
    fn ring_is_bounded() {
        let store = WhowasStore::new(2);
        for i in 0..5 {
            store.record(entry("bob", i));
        }
        let found = store.lookup("bob", 10);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].logout_at, 4);
    }

    #[test]
    fn lookup_count_limits() {
        let store = WhowasStore::new(8);
        for i in 0..5 {
            store.record(entry("carol", i));
        }
        assert_eq!(store.lookup("carol", 3).len(), 3);
    }

    #[test]
    fn prune_by_age() {
        let store = WhowasStore::new(8);
        let now = chrono::Utc::now().timestamp();
        store.record(entry("dave", now - 1000));
        store.record(entry("dave", now));
        assert_eq!(store.prune(500), 1);
        assert_eq!(store.lookup("dave", 10).len(), 1);
    }
}
