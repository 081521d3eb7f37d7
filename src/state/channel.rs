//! Channel-related types and state.

use std::collections::{HashMap, HashSet};

use corvus_proto::{irc_to_lower, matches_hostmask, mode::member_prefixes};

/// A channel topic with attribution.
#[derive(Debug, Clone)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

/// An entry in a channel list mode (+b, +e, +I).
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub mask: String,
    pub set_by: String,
    pub set_at: i64,
}

/// Channel flag modes plus the parametered key/limit settings.
#[derive(Debug, Default, Clone)]
pub struct ChannelModes {
    pub invite_only: bool,      // +i
    pub moderated: bool,        // +m
    pub no_external: bool,      // +n
    pub secret: bool,           // +s
    pub private_: bool,         // +p
    pub topic_protected: bool,  // +t
    pub no_ctcp: bool,          // +C
    pub no_colors: bool,        // +c
    pub strip_colors: bool,     // +S
    pub registered_only: bool,  // +R
    /// +k; when set the key is non-empty.
    pub key: Option<String>,
    /// +l; when set the limit is greater than zero.
    pub limit: Option<u32>,
}

impl ChannelModes {
    /// Apply a flag-mode letter (type C/D). Returns false for letters that
    /// are not simple channel flags.
    pub fn apply_flag(&mut self, adding: bool, letter: char) -> bool {
        match letter {
            'i' => self.invite_only = adding,
            'm' => self.moderated = adding,
            'n' => self.no_external = adding,
            's' => self.secret = adding,
            'p' => self.private_ = adding,
            't' => self.topic_protected = adding,
            'C' => self.no_ctcp = adding,
            'c' => self.no_colors = adding,
            'S' => self.strip_colors = adding,
            'R' => self.registered_only = adding,
            _ => return false,
        }
        true
    }

    /// Render modes for RPL_CHANNELMODEIS; key and limit values are only
    /// included when `show_params` (member or operator view).
    pub fn as_mode_string(&self, show_params: bool) -> (String, Vec<String>) {
        let mut s = String::from("+");
        let mut args = Vec::new();
        if self.invite_only {
            s.push('i');
        }
        if self.moderated {
            s.push('m');
        }
        if self.no_external {
            s.push('n');
        }
        if self.secret {
            s.push('s');
        }
        if self.private_ {
            s.push('p');
        }
        if self.topic_protected {
            s.push('t');
        }
        if self.no_ctcp {
            s.push('C');
        }
        if self.no_colors {
            s.push('c');
        }
        if self.strip_colors {
            s.push('S');
        }
        if self.registered_only {
            s.push('R');
        }
        if self.key.is_some() {
            s.push('k');
            if show_params {
                args.push(self.key.clone().unwrap_or_default());
            }
        }
        if let Some(limit) = self.limit {
            s.push('l');
            if show_params {
                args.push(limit.to_string());
            }
        }
        (s, args)
    }
}

/// Per-member channel modes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemberModes {
    pub owner: bool,  // +q, prefix ~
    pub admin: bool,  // +a, prefix &
    pub op: bool,     // +o, prefix @
    pub halfop: bool, // +h, prefix %
    pub voice: bool,  // +v, prefix +
}

impl MemberModes {
    pub fn op() -> Self {
        MemberModes {
            op: true,
            ..Default::default()
        }
    }

    /// Mode letters in precedence order.
    pub fn letters(&self) -> Vec<char> {
        let mut out = Vec::new();
        if self.owner {
            out.push('q');
        }
        if self.admin {
            out.push('a');
        }
        if self.op {
            out.push('o');
        }
        if self.halfop {
            out.push('h');
        }
        if self.voice {
            out.push('v');
        }
        out
    }

    /// Visible prefix string for NAMES/WHO.
    pub fn prefixes(&self, multi_prefix: bool) -> String {
        member_prefixes(&self.letters(), multi_prefix)
    }

    pub fn apply(&mut self, adding: bool, letter: char) -> bool {
        match letter {
            'q' => self.owner = adding,
            'a' => self.admin = adding,
            'o' => self.op = adding,
            'h' => self.halfop = adding,
            'v' => self.voice = adding,
            _ => return false,
        }
        true
    }

    pub fn has_voice_or_higher(&self) -> bool {
        self.voice || self.has_halfop_or_higher()
    }

    pub fn has_halfop_or_higher(&self) -> bool {
        self.halfop || self.has_op_or_higher()
    }

    pub fn has_op_or_higher(&self) -> bool {
        self.op || self.admin || self.owner
    }

    /// Comparable rank: higher outranks lower.
    pub fn rank(&self) -> u8 {
        if self.owner {
            5
        } else if self.admin {
            4
        } else if self.op {
            3
        } else if self.halfop {
            2
        } else if self.voice {
            1
        } else {
            0
        }
    }
}

/// A channel member record. The channel is the authoritative container;
/// the user's channel map mirrors it.
#[derive(Debug, Clone)]
pub struct Member {
    pub uid: String,
    /// Cached nickname for NAMES/WHO without a user-lock round trip.
    pub nick: String,
    pub modes: MemberModes,
}

/// A channel.
#[derive(Debug)]
pub struct Channel {
    /// Case-preserved channel name (`#` or `&` sigil).
    pub name: String,
    pub modes: ChannelModes,
    pub topic: Option<Topic>,
    /// Members by UID.
    pub members: HashMap<String, Member>,
    pub bans: Vec<ListEntry>,
    pub ban_exceptions: Vec<ListEntry>,
    pub invite_exceptions: Vec<ListEntry>,
    /// UIDs explicitly INVITEd, cleared on join.
    pub invited: HashSet<String>,
    /// Channel TS, used for S2S conflict resolution.
    pub created_at: i64,
    /// Whether ChanServ holds a registration for this name (keeps the
    /// channel alive when empty).
    pub registered: bool,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modes: ChannelModes::default(),
            topic: None,
            members: HashMap::new(),
            bans: Vec::new(),
            ban_exceptions: Vec::new(),
            invite_exceptions: Vec::new(),
            invited: HashSet::new(),
            created_at: chrono::Utc::now().timestamp(),
            registered: false,
        }
    }

    /// The lowercase lookup key for this channel.
    pub fn key(&self) -> String {
        irc_to_lower(&self.name)
    }

    /// Add a member; fails when the UID is already present.
    pub fn add_member(&mut self, uid: &str, nick: &str, modes: MemberModes) -> bool {
        if self.members.contains_key(uid) {
            return false;
        }
        self.members.insert(
            uid.to_string(),
            Member {
                uid: uid.to_string(),
                nick: nick.to_string(),
                modes,
            },
        );
        self.invited.remove(uid);
        true
    }

    /// Remove a member; returns the removed record.
    pub fn remove_member(&mut self, uid: &str) -> Option<Member> {
        self.members.remove(uid)
    }

    pub fn member(&self, uid: &str) -> Option<&Member> {
        self.members.get(uid)
    }

    pub fn member_modes(&self, uid: &str) -> MemberModes {
        self.members
            .get(uid)
            .map(|m| m.modes)
            .unwrap_or_default()
    }

    /// Set the topic, updating setter and timestamp.
    ///
    /// The timestamp is clamped monotonic with respect to the previous
    /// local write.
    pub fn set_topic(&mut self, text: impl Into<String>, set_by: impl Into<String>) {
        let now = chrono::Utc::now().timestamp();
        let set_at = match &self.topic {
            Some(prev) if prev.set_at >= now => prev.set_at + 1,
            _ => now,
        };
        self.topic = Some(Topic {
            text: text.into(),
            set_by: set_by.into(),
            set_at,
        });
    }

    /// Add a ban mask; duplicate adds are a no-op returning false.
    pub fn add_ban(&mut self, mask: &str, set_by: &str) -> bool {
        Self::add_list_entry(&mut self.bans, mask, set_by)
    }

    pub fn remove_ban(&mut self, mask: &str) -> bool {
        Self::remove_list_entry(&mut self.bans, mask)
    }

    pub fn add_ban_exception(&mut self, mask: &str, set_by: &str) -> bool {
        Self::add_list_entry(&mut self.ban_exceptions, mask, set_by)
    }

    pub fn remove_ban_exception(&mut self, mask: &str) -> bool {
        Self::remove_list_entry(&mut self.ban_exceptions, mask)
    }

    pub fn add_invite_exception(&mut self, mask: &str, set_by: &str) -> bool {
        Self::add_list_entry(&mut self.invite_exceptions, mask, set_by)
    }

    pub fn remove_invite_exception(&mut self, mask: &str) -> bool {
        Self::remove_list_entry(&mut self.invite_exceptions, mask)
    }

    fn add_list_entry(list: &mut Vec<ListEntry>, mask: &str, set_by: &str) -> bool {
        if list.iter().any(|e| irc_to_lower(&e.mask) == irc_to_lower(mask)) {
            return false;
        }
        list.push(ListEntry {
            mask: mask.to_string(),
            set_by: set_by.to_string(),
            set_at: chrono::Utc::now().timestamp(),
        });
        true
    }

    fn remove_list_entry(list: &mut Vec<ListEntry>, mask: &str) -> bool {
        let before = list.len();
        list.retain(|e| irc_to_lower(&e.mask) != irc_to_lower(mask));
        list.len() != before
    }

    /// Grant or revoke a member mode bit.
    pub fn set_member_mode(&mut self, uid: &str, adding: bool, letter: char) -> bool {
        match self.members.get_mut(uid) {
            Some(member) => member.modes.apply(adding, letter),
            None => false,
        }
    }

    /// Whether the given full mask is banned (+b minus +e).
    pub fn is_banned(&self, mask: &str) -> bool {
        let banned = self.bans.iter().any(|e| matches_hostmask(&e.mask, mask));
        if !banned {
            return false;
        }
        !self
            .ban_exceptions
            .iter()
            .any(|e| matches_hostmask(&e.mask, mask))
    }

    /// Whether a mask satisfies invite-only via +I.
    pub fn matches_invite_exception(&self, mask: &str) -> bool {
        self.invite_exceptions
            .iter()
            .any(|e| matches_hostmask(&e.mask, mask))
    }

    /// Visible member count (LIST, LUSERS).
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the channel should be destroyed once empty.
    pub fn removable_when_empty(&self) -> bool {
        !self.registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_member_rejects_duplicates() {
        let mut chan = Channel::new("#rust");
        assert!(chan.add_member("001AAAABA", "alice", MemberModes::op()));
        assert!(!chan.add_member("001AAAABA", "alice", MemberModes::default()));
        assert_eq!(chan.member_count(), 1);
    }

    #[test]
    fn ban_add_remove_idempotent() {
        let mut chan = Channel::new("#rust");
        assert!(chan.add_ban("*!*@spam.example", "alice"));
        assert!(!chan.add_ban("*!*@SPAM.example", "bob"));
        assert!(chan.remove_ban("*!*@spam.example"));
        assert!(!chan.remove_ban("*!*@spam.example"));
        assert!(chan.bans.is_empty());
    }

    #[test]
    fn ban_exception_subsumes_ban() {
        let mut chan = Channel::new("#rust");
        chan.add_ban("*!*@*.example", "op");
        assert!(chan.is_banned("eve!user@evil.example"));
        chan.add_ban_exception("eve!*@*.example", "op");
        assert!(!chan.is_banned("eve!user@evil.example"));
        assert!(chan.is_banned("mal!user@evil.example"));
    }

    #[test]
    fn topic_timestamp_monotonic() {
        let mut chan = Channel::new("#rust");
        chan.set_topic("first", "alice");
        let t1 = chan.topic.as_ref().unwrap().set_at;
        chan.set_topic("second", "bob");
        let t2 = chan.topic.as_ref().unwrap().set_at;
        assert!(t2 > t1);
        assert_eq!(chan.topic.as_ref().unwrap().text, "second");
        assert_eq!(chan.topic.as_ref().unwrap().set_by, "bob");
    }

    #[test]
    fn member_mode_rank() {
        let mut modes = MemberModes::default();
        assert_eq!(modes.rank(), 0);
        modes.apply(true, 'v');
        assert!(modes.has_voice_or_higher());
        assert!(!modes.has_op_or_higher());
        modes.apply(true, 'o');
        assert!(modes.has_op_or_higher());
        assert_eq!(modes.prefixes(true), "@+");
        assert_eq!(modes.prefixes(false), "@");
    }

    #[test]
    fn invite_cleared_on_join() {
        let mut chan = Channel::new("#rust");
        chan.invited.insert("001AAAABA".to_string());
        chan.add_member("001AAAABA", "alice", MemberModes::default());
        assert!(chan.invited.is_empty());
    }

    #[test]
    fn mode_string_hides_key_from_outsiders() {
        let mut chan = Channel::new("#rust");
        chan.modes.key = Some("hunter2".to_string());
        chan.modes.limit = Some(10);
        chan.modes.moderated = true;
        let (modes, args) = chan.modes.as_mode_string(false);
        assert_eq!(modes, "+mkl");
        assert!(args.is_empty());
        let (_, args) = chan.modes.as_mode_string(true);
        assert_eq!(args, vec!["hunter2", "10"]);
    }
}
