//! IRCv3 MONITOR lists.
//!
//! Tracks which connections watch which nicknames so presence changes can
//! be pushed as RPL_MONONLINE / RPL_MONOFFLINE.

use std::collections::HashSet;

use corvus_proto::irc_to_lower;
use dashmap::DashMap;

/// Outcome of adding targets to a monitor list.
#[derive(Debug, Default)]
pub struct MonitorAdd {
    pub added: Vec<String>,
    /// Targets rejected because the list limit was reached.
    pub overflow: Vec<String>,
}

/// Monitor list state.
pub struct MonitorManager {
    /// Lowercase nick -> set of watching UIDs.
    watchers: DashMap<String, HashSet<String>>,
    /// UID -> lowercase nicks watched.
    lists: DashMap<String, HashSet<String>>,
    limit: usize,
}

impl MonitorManager {
    pub fn new(limit: usize) -> Self {
        Self {
            watchers: DashMap::new(),
            lists: DashMap::new(),
            limit,
        }
    }

    /// Add targets for a watcher, honoring the list limit atomically: the
    /// overflow set is returned for ERR_MONLISTFULL.
    pub fn add(&self, uid: &str, targets: &[&str]) -> MonitorAdd {
        let mut result = MonitorAdd::default();
        let mut list = self.lists.entry(uid.to_string()).or_default();
        for target in targets {
            let key = irc_to_lower(target);
            if list.contains(&key) {
                continue;
            }
            if list.len() >= self.limit {
                result.overflow.push(target.to_string());
                continue;
            }
            list.insert(key.clone());
            self.watchers.entry(key).or_default().insert(uid.to_string());
            result.added.push(target.to_string());
        }
        result
    }

    /// Remove targets for a watcher.
    pub fn remove(&self, uid: &str, targets: &[&str]) {
        if let Some(mut list) = self.lists.get_mut(uid) {
            for target in targets {
                let key = irc_to_lower(target);
                if list.remove(&key) {
                    self.unwatch(&key, uid);
                }
            }
        }
    }

    /// Clear a watcher's whole list.
    pub fn clear(&self, uid: &str) {
        if let Some((_, list)) = self.lists.remove(uid) {
            for key in list {
                self.unwatch(&key, uid);
            }
        }
    }

    /// The watcher's list (lowercase nicks).
    pub fn list(&self, uid: &str) -> Vec<String> {
        self.lists
            .get(uid)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// UIDs watching the given nickname.
    pub fn watchers_of(&self, nick: &str) -> Vec<String> {
        self.watchers
            .get(&irc_to_lower(nick))
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn unwatch(&self, key: &str, uid: &str) {
        let emptied = match self.watchers.get_mut(key) {
            Some(mut watchers) => {
                watchers.remove(uid);
                watchers.is_empty()
            }
            None => false,
        };
        if emptied {
            self.watchers.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_notify_set() {
        let mon = MonitorManager::new(10);
        mon.add("u1", &["alice", "bob"]);
        mon.add("u2", &["ALICE"]);
        let mut watchers = mon.watchers_of("alice");
        watchers.sort();
        assert_eq!(watchers, vec!["u1", "u2"]);
    }

    #[test]
    fn limit_overflow_reported() {
        let mon = MonitorManager::new(2);
        let result = mon.add("u1", &["a", "b", "c", "d"]);
        assert_eq!(result.added, vec!["a", "b"]);
        assert_eq!(result.overflow, vec!["c", "d"]);
    }

    #[test]
    fn duplicates_ignored() {
        let mon = MonitorManager::new(2);
        mon.add("u1", &["alice"]);
        let result = mon.add("u1", &["ALICE", "bob"]);
        assert_eq!(result.added, vec!["bob"]);
        assert!(result.overflow.is_empty());
    }

    #[test]
    fn clear_removes_reverse_index() {
        let mon = MonitorManager::new(10);
        mon.add("u1", &["alice"]);
        mon.clear("u1");
        assert!(mon.watchers_of("alice").is_empty());
        assert!(mon.list("u1").is_empty());
    }

    #[test]
    fn remove_specific_targets() {
        let mon = MonitorManager::new(10);
        mon.add("u1", &["alice", "bob"]);
        mon.remove("u1", &["alice"]);
        assert!(mon.watchers_of("alice").is_empty());
        assert_eq!(mon.watchers_of("bob"), vec!["u1"]);
    }
}
