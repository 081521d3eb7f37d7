//! User index management.
//!
//! Owns the UID index and the nickname index. Nickname uniqueness (a
//! cross-entity invariant) is enforced here, under the index's own lock.

use std::sync::Arc;

use corvus_proto::irc_to_lower;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;

use crate::state::{Uid, UidGenerator, User};

/// Why a nickname claim failed.
#[derive(Debug, PartialEq, Eq)]
pub enum NickClaimError {
    InUse,
}

/// The user index: UID -> user, plus the case-insensitive nickname index.
pub struct UserManager {
    pub users: DashMap<Uid, Arc<RwLock<User>>>,
    /// Lowercase nickname -> UID.
    nicks: DashMap<String, Uid>,
    pub uid_gen: UidGenerator,
    sid: String,
}

impl UserManager {
    pub fn new(sid: String) -> Self {
        Self {
            users: DashMap::new(),
            nicks: DashMap::new(),
            uid_gen: UidGenerator::new(sid.clone()),
            sid,
        }
    }

    /// Whether a UID belongs to this server.
    pub fn is_local(&self, uid: &str) -> bool {
        uid.starts_with(&self.sid)
    }

    /// Claim a nickname for a UID. Fails if another UID holds it.
    pub fn claim_nick(&self, nick: &str, uid: &str) -> Result<(), NickClaimError> {
        match self.nicks.entry(irc_to_lower(nick)) {
            Entry::Occupied(existing) if existing.get() != uid => Err(NickClaimError::InUse),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(uid.to_string());
                Ok(())
            }
        }
    }

    /// Atomically move a UID from one nickname to another.
    pub fn rename(&self, old_nick: &str, new_nick: &str, uid: &str) -> Result<(), NickClaimError> {
        let old_key = irc_to_lower(old_nick);
        let new_key = irc_to_lower(new_nick);
        if old_key == new_key {
            // Case-only change; the index key is unchanged.
            return Ok(());
        }
        self.claim_nick(new_nick, uid)?;
        self.release_nick_of(&old_key, uid);
        Ok(())
    }

    /// Release a nickname, but only if this UID still holds it.
    pub fn release_nick(&self, nick: &str, uid: &str) {
        self.release_nick_of(&irc_to_lower(nick), uid);
    }

    fn release_nick_of(&self, key: &str, uid: &str) {
        self.nicks.remove_if(key, |_, holder| holder == uid);
    }

    /// Whether a nickname is taken (by anyone).
    pub fn nick_in_use(&self, nick: &str) -> bool {
        self.nicks.contains_key(&irc_to_lower(nick))
    }

    /// Resolve a nickname to a UID.
    pub fn uid_of_nick(&self, nick: &str) -> Option<Uid> {
        self.nicks.get(&irc_to_lower(nick)).map(|u| u.clone())
    }

    /// Insert a user record; the nickname must have been claimed first.
    pub fn insert(&self, user: User) -> Arc<RwLock<User>> {
        let uid = user.uid.clone();
        let arc = Arc::new(RwLock::new(user));
        self.users.insert(uid, arc.clone());
        arc
    }

    pub fn get(&self, uid: &str) -> Option<Arc<RwLock<User>>> {
        self.users.get(uid).map(|u| u.value().clone())
    }

    pub fn by_nick(&self, nick: &str) -> Option<Arc<RwLock<User>>> {
        self.uid_of_nick(nick).and_then(|uid| self.get(&uid))
    }

    /// Remove a user and release its nickname.
    pub fn remove(&self, uid: &str, nick: &str) {
        self.release_nick(nick, uid);
        self.users.remove(uid);
    }

    /// Snapshot of every UID (for burst and sweeps).
    pub fn all_uids(&self) -> Vec<Uid> {
        self.users.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of local UIDs only.
    pub fn local_uids(&self) -> Vec<Uid> {
        self.users
            .iter()
            .map(|e| e.key().clone())
            .filter(|uid| self.is_local(uid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::user::UserParams;
    use std::collections::HashSet;

    fn manager() -> UserManager {
        UserManager::new("001".to_string())
    }

    fn user(uid: &str, nick: &str) -> User {
        User::new(UserParams {
            uid: uid.into(),
            nick: nick.into(),
            nick_ts: 0,
            ident: "u".into(),
            realname: "r".into(),
            host: "h".into(),
            ip: "127.0.0.1".into(),
            visible_host: "h".into(),
            account: None,
            caps: HashSet::new(),
            certfp: None,
            secure: false,
        })
    }

    #[test]
    fn nickname_uniqueness_case_insensitive() {
        let m = manager();
        m.claim_nick("Alice", "001AAAABA").unwrap();
        assert_eq!(
            m.claim_nick("ALICE", "001AAAABB"),
            Err(NickClaimError::InUse)
        );
        // Re-claiming your own nick is fine.
        assert!(m.claim_nick("alice", "001AAAABA").is_ok());
    }

    #[test]
    fn rename_swaps_index() {
        let m = manager();
        m.claim_nick("alice", "001AAAABA").unwrap();
        m.rename("alice", "alicia", "001AAAABA").unwrap();
        assert_eq!(m.uid_of_nick("alicia").as_deref(), Some("001AAAABA"));
        assert!(m.uid_of_nick("alice").is_none());
    }

    #[test]
    fn rename_to_taken_nick_fails() {
        let m = manager();
        m.claim_nick("alice", "001AAAABA").unwrap();
        m.claim_nick("bob", "001AAAABB").unwrap();
        assert!(m.rename("alice", "BOB", "001AAAABA").is_err());
        // The old mapping must survive a failed rename.
        assert_eq!(m.uid_of_nick("alice").as_deref(), Some("001AAAABA"));
    }

    #[test]
    fn registered_user_is_indexed() {
        let m = manager();
        m.claim_nick("alice", "001AAAABA").unwrap();
        m.insert(user("001AAAABA", "alice"));
        assert!(m.by_nick("ALICE").is_some());
        m.remove("001AAAABA", "alice");
        assert!(m.by_nick("alice").is_none());
        assert!(!m.nick_in_use("alice"));
    }

    #[test]
    fn locality() {
        let m = manager();
        assert!(m.is_local("001AAAABA"));
        assert!(!m.is_local("042AAAABA"));
    }

    #[test]
    fn release_only_by_holder() {
        let m = manager();
        m.claim_nick("alice", "001AAAABA").unwrap();
        m.release_nick("alice", "001AAAABB");
        assert!(m.nick_in_use("alice"));
    }
}
