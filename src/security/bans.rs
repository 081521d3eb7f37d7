//! Server ban engine: K/G/Z-lines and jupes.
//!
//! Active bans are cached in memory and consulted on registration and on
//! every nickname change; the persistent copy lives in the server-ban
//! repository. Expired bans are ignored at match time and garbage
//! collected lazily.

use corvus_proto::matches_hostmask;
use parking_lot::RwLock;

/// Ban kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanKind {
    /// Local user@host ban.
    K,
    /// Network-wide user@host ban (AKILL).
    G,
    /// IP ban.
    Z,
    /// Server-name ban preventing relink.
    Jupe,
}

impl BanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanKind::K => "K-line",
            BanKind::G => "G-line",
            BanKind::Z => "Z-line",
            BanKind::Jupe => "JUPE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "K" => Some(BanKind::K),
            "G" => Some(BanKind::G),
            "Z" => Some(BanKind::Z),
            "JUPE" => Some(BanKind::Jupe),
            _ => None,
        }
    }
}

/// One server ban.
#[derive(Debug, Clone)]
pub struct ServerBan {
    pub kind: BanKind,
    /// `user@host` glob for K/G, IP or CIDR-less IP glob for Z, server
    /// name for Jupe.
    pub mask: String,
    pub reason: String,
    pub set_by: String,
    pub set_at: i64,
    /// Unix expiry; `None` is permanent.
    pub expires_at: Option<i64>,
}

impl ServerBan {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// In-memory ban cache.
pub struct BanManager {
    bans: RwLock<Vec<ServerBan>>,
}

impl BanManager {
    pub fn new(initial: Vec<ServerBan>) -> Self {
        Self {
            bans: RwLock::new(initial),
        }
    }

    /// Add a ban; replaces an existing ban of the same kind and mask.
    pub fn add(&self, ban: ServerBan) {
        let mut bans = self.bans.write();
        bans.retain(|b| !(b.kind == ban.kind && b.mask.eq_ignore_ascii_case(&ban.mask)));
        bans.push(ban);
    }

    /// Remove a ban by kind and mask; returns whether one was removed.
    pub fn remove(&self, kind: BanKind, mask: &str) -> bool {
        let mut bans = self.bans.write();
        let before = bans.len();
        bans.retain(|b| !(b.kind == kind && b.mask.eq_ignore_ascii_case(mask)));
        bans.len() != before
    }

    /// Test a user against active K, G and Z lines.
    ///
    /// `usermask` is `user@host` (real host); `ip` the source address.
    pub fn check_user(&self, usermask: &str, ip: &str) -> Option<ServerBan> {
        let now = chrono::Utc::now().timestamp();
        let bans = self.bans.read();
        bans.iter()
            .find(|ban| {
                if ban.is_expired(now) {
                    return false;
                }
                match ban.kind {
                    BanKind::K | BanKind::G => matches_hostmask(&ban.mask, usermask),
                    BanKind::Z => matches_hostmask(&ban.mask, ip),
                    BanKind::Jupe => false,
                }
            })
            .cloned()
    }

    /// Whether a server name is juped.
    pub fn is_juped(&self, server_name: &str) -> Option<ServerBan> {
        let now = chrono::Utc::now().timestamp();
        let bans = self.bans.read();
        bans.iter()
            .find(|ban| {
                ban.kind == BanKind::Jupe
                    && !ban.is_expired(now)
                    && ban.mask.eq_ignore_ascii_case(server_name)
            })
            .cloned()
    }

    /// Active bans of one kind (for STATS and AKILL LIST).
    pub fn list(&self, kind: BanKind) -> Vec<ServerBan> {
        let now = chrono::Utc::now().timestamp();
        self.bans
            .read()
            .iter()
            .filter(|b| b.kind == kind && !b.is_expired(now))
            .cloned()
            .collect()
    }

    /// Drop expired bans; returns how many were collected.
    pub fn prune_expired(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        let mut bans = self.bans.write();
        let before = bans.len();
        bans.retain(|b| !b.is_expired(now));
        before - bans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ban(kind: BanKind, mask: &str, expires_at: Option<i64>) -> ServerBan {
        ServerBan {
            kind,
            mask: mask.to_string(),
            reason: "test".to_string(),
            set_by: "oper".to_string(),
            set_at: 0,
            expires_at,
        }
    }

    #[test]
    fn kline_matches_usermask() {
        let mgr = BanManager::new(vec![ban(BanKind::K, "*@*.spam.example", None)]);
        assert!(mgr.check_user("eve@proxy.spam.example", "192.0.2.9").is_some());
        assert!(mgr.check_user("alice@home.example", "192.0.2.1").is_none());
    }

    #[test]
    fn zline_matches_ip() {
        let mgr = BanManager::new(vec![ban(BanKind::Z, "192.0.2.*", None)]);
        assert!(mgr.check_user("anyone@anywhere", "192.0.2.55").is_some());
        assert!(mgr.check_user("anyone@anywhere", "198.51.100.1").is_none());
    }

    #[test]
    fn expired_bans_are_absent() {
        let past = chrono::Utc::now().timestamp() - 10;
        let mgr = BanManager::new(vec![ban(BanKind::K, "*@*", Some(past))]);
        assert!(mgr.check_user("eve@anywhere", "192.0.2.9").is_none());
        assert_eq!(mgr.prune_expired(), 1);
    }

    #[test]
    fn jupe_blocks_server_name() {
        let mgr = BanManager::new(vec![ban(BanKind::Jupe, "bad.server.example", None)]);
        assert!(mgr.is_juped("BAD.SERVER.EXAMPLE").is_some());
        assert!(mgr.is_juped("good.server.example").is_none());
        // Jupes never match users.
        assert!(mgr.check_user("any@bad.server.example", "192.0.2.1").is_none());
    }

    #[test]
    fn add_replaces_same_mask() {
        let mgr = BanManager::new(vec![]);
        mgr.add(ban(BanKind::G, "*@evil.example", None));
        mgr.add(ban(BanKind::G, "*@EVIL.example", None));
        assert_eq!(mgr.list(BanKind::G).len(), 1);
        assert!(mgr.remove(BanKind::G, "*@evil.example"));
        assert!(mgr.list(BanKind::G).is_empty());
    }
}
