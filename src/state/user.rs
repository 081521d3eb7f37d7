//! User-related types and state.

use std::collections::{HashMap, HashSet};

/// A connected user (local or learned over S2S).
#[derive(Debug)]
pub struct User {
    /// TS6 UID; the connection identity.
    pub uid: String,
    /// Current nickname (case-preserved).
    pub nick: String,
    /// TS6 nickname timestamp, used for collision resolution.
    pub nick_ts: i64,
    /// Ident/username.
    pub ident: String,
    pub realname: String,
    /// Real hostname.
    pub host: String,
    /// Real IP address of the connection.
    pub ip: String,
    /// Hostname shown to other users (cloak or vhost).
    pub visible_host: String,
    /// Account name if identified to NickServ.
    pub account: Option<String>,
    /// User modes.
    pub modes: UserModes,
    /// Away message if marked away.
    pub away: Option<String>,
    /// Channels this user is in: lowercase name -> member mode letters.
    pub channels: HashMap<String, Vec<char>>,
    /// IRCv3 capabilities negotiated by this client.
    pub caps: HashSet<String>,
    /// TLS client certificate fingerprint (SHA-256 hex), if presented.
    pub certfp: Option<String>,
    /// Caller-ID accept list (lowercase nicks), consulted when +g is set.
    pub accept_list: HashSet<String>,
    /// Unix timestamp when this user connected.
    pub connected_at: i64,
    /// Unix timestamp of the last command from this user.
    pub last_activity: i64,
    /// Operator class name after a successful OPER.
    pub oper_class: Option<String>,
}

/// User modes.
#[derive(Debug, Default, Clone)]
pub struct UserModes {
    pub invisible: bool,      // +i
    pub wallops: bool,        // +w
    pub oper: bool,           // +o
    pub registered: bool,     // +r (identified to NickServ)
    pub secure: bool,         // +Z (TLS connection)
    pub caller_id: bool,      // +g (accept-list only)
    pub bot: bool,            // +B
    pub service: bool,        // +S (network service - protected)
}

impl UserModes {
    /// Convert modes to a string like `+iw`.
    pub fn as_mode_string(&self) -> String {
        let mut s = String::from("+");
        if self.invisible {
            s.push('i');
        }
        if self.wallops {
            s.push('w');
        }
        if self.oper {
            s.push('o');
        }
        if self.registered {
            s.push('r');
        }
        if self.secure {
            s.push('Z');
        }
        if self.caller_id {
            s.push('g');
        }
        if self.bot {
            s.push('B');
        }
        if self.service {
            s.push('S');
        }
        s
    }

    /// Apply a single mode letter; returns false for unknown letters.
    ///
    /// `+o` cannot be granted this way (OPER and S2S set it directly), and
    /// `+Z`/`+S`/`+r` are server-managed.
    pub fn apply(&mut self, adding: bool, letter: char) -> bool {
        match letter {
            'i' => self.invisible = adding,
            'w' => self.wallops = adding,
            'g' => self.caller_id = adding,
            'B' => self.bot = adding,
            'o' if !adding => self.oper = false,
            _ => return false,
        }
        true
    }
}

/// Parameters for creating a new local user.
pub struct UserParams {
    pub uid: String,
    pub nick: String,
    pub nick_ts: i64,
    pub ident: String,
    pub realname: String,
    pub host: String,
    pub ip: String,
    pub visible_host: String,
    pub account: Option<String>,
    pub caps: HashSet<String>,
    pub certfp: Option<String>,
    pub secure: bool,
}

impl User {
    pub fn new(params: UserParams) -> Self {
        let now = chrono::Utc::now().timestamp();
        let registered = params.account.is_some();
        Self {
            uid: params.uid,
            nick: params.nick,
            nick_ts: params.nick_ts,
            ident: params.ident,
            realname: params.realname,
            host: params.host,
            ip: params.ip,
            visible_host: params.visible_host,
            account: params.account,
            modes: UserModes {
                secure: params.secure,
                registered,
                ..Default::default()
            },
            away: None,
            channels: HashMap::new(),
            caps: params.caps,
            certfp: params.certfp,
            accept_list: HashSet::new(),
            connected_at: now,
            last_activity: now,
            oper_class: None,
        }
    }

    /// The user's `nick!ident@visible-host` mask as seen by other users.
    pub fn mask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.visible_host)
    }

    /// The user's real hostmask (`ident@host`) for ban matching.
    pub fn real_usermask(&self) -> String {
        format!("{}@{}", self.ident, self.host)
    }

    /// Full mask against which channel bans are tested.
    pub fn ban_mask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.visible_host)
    }

    /// Record channel membership on the user side.
    ///
    /// The channel's member table stays authoritative; this mirror exists
    /// for O(1) "which channels am I in" queries.
    pub fn join_channel(&mut self, name_lower: &str, mode_letters: Vec<char>) {
        self.channels.insert(name_lower.to_string(), mode_letters);
    }

    /// Remove channel membership on the user side.
    pub fn part_channel(&mut self, name_lower: &str) {
        self.channels.remove(name_lower);
    }

    /// Whether this user accepts messages from the given nick under +g.
    pub fn accepts(&self, nick: &str) -> bool {
        self.accept_list
            .contains(&corvus_proto::irc_to_lower(nick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User::new(UserParams {
            uid: "001AAAABA".into(),
            nick: "alice".into(),
            nick_ts: 1_700_000_000,
            ident: "alice".into(),
            realname: "Alice".into(),
            host: "host.example".into(),
            ip: "192.0.2.1".into(),
            visible_host: "cloak.ip".into(),
            account: None,
            caps: HashSet::new(),
            certfp: None,
            secure: false,
        })
    }

    #[test]
    fn mode_string() {
        let mut modes = UserModes::default();
        assert_eq!(modes.as_mode_string(), "+");
        modes.invisible = true;
        modes.wallops = true;
        assert_eq!(modes.as_mode_string(), "+iw");
        modes.oper = true;
        modes.secure = true;
        assert_eq!(modes.as_mode_string(), "+iwoZ");
    }

    #[test]
    fn apply_cannot_grant_oper() {
        let mut modes = UserModes::default();
        assert!(!modes.apply(true, 'o'));
        assert!(!modes.oper);
        modes.oper = true;
        assert!(modes.apply(false, 'o'));
        assert!(!modes.oper);
    }

    #[test]
    fn masks() {
        let user = test_user();
        assert_eq!(user.mask(), "alice!alice@cloak.ip");
        assert_eq!(user.real_usermask(), "alice@host.example");
    }

    #[test]
    fn channel_mirror() {
        let mut user = test_user();
        user.join_channel("#rust", vec!['o']);
        assert!(user.channels.contains_key("#rust"));
        user.part_channel("#rust");
        assert!(user.channels.is_empty());
    }

    #[test]
    fn accept_list_is_casemapped() {
        let mut user = test_user();
        user.accept_list.insert("bob".to_string());
        assert!(user.accepts("BOB"));
        assert!(!user.accepts("carol"));
    }
}
