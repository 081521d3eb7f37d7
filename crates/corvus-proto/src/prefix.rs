//! Message prefix (source) types.

use std::fmt;

use crate::error::MessageParseError;

/// The source of an IRC message.
///
/// Either a server name (or TS6 SID) or a `nick!user@host` user mask.
/// On S2S links the "nickname" position carries a UID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prefix {
    /// A server name or SID, e.g. `irc.example.org` or `001`.
    ServerName(String),
    /// A user mask: nick (or UID), ident, host.
    Nickname(String, String, String),
}

impl Prefix {
    /// Build a user prefix from its parts.
    pub fn new(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Prefix::Nickname(nick.into(), user.into(), host.into())
    }

    /// Parse a prefix token (without the leading `:`).
    ///
    /// A token containing `!` or `@` is a user mask; a token containing `.`
    /// is a server name; anything else (a bare nick or SID/UID) is carried
    /// as a nickname with empty user and host.
    pub fn parse(s: &str) -> Result<Prefix, MessageParseError> {
        if s.is_empty() {
            return Err(MessageParseError::InvalidPrefix(s.to_string()));
        }
        if s.contains(' ') {
            return Err(MessageParseError::InvalidPrefix(s.to_string()));
        }

        if let Some((nick, rest)) = s.split_once('!') {
            let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
            return Ok(Prefix::Nickname(
                nick.to_string(),
                user.to_string(),
                host.to_string(),
            ));
        }
        if let Some((nick, host)) = s.split_once('@') {
            return Ok(Prefix::Nickname(
                nick.to_string(),
                String::new(),
                host.to_string(),
            ));
        }
        if s.contains('.') {
            return Ok(Prefix::ServerName(s.to_string()));
        }
        Ok(Prefix::Nickname(s.to_string(), String::new(), String::new()))
    }

    /// The nickname (or UID/SID) portion of this prefix.
    pub fn name(&self) -> &str {
        match self {
            Prefix::ServerName(name) => name,
            Prefix::Nickname(nick, _, _) => nick,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => write!(f, "{}", name),
            Prefix::Nickname(nick, user, host) => {
                write!(f, "{}", nick)?;
                if !user.is_empty() {
                    write!(f, "!{}", user)?;
                }
                if !host.is_empty() {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_mask() {
        let p = Prefix::parse("nick!user@host").unwrap();
        assert_eq!(p, Prefix::new("nick", "user", "host"));
    }

    #[test]
    fn parse_server() {
        let p = Prefix::parse("irc.example.org").unwrap();
        assert_eq!(p, Prefix::ServerName("irc.example.org".to_string()));
    }

    #[test]
    fn parse_bare_token() {
        // SIDs and UIDs arrive as bare tokens on S2S links.
        let p = Prefix::parse("001AAAAAB").unwrap();
        assert_eq!(p.name(), "001AAAAAB");
    }

    #[test]
    fn display_round_trip() {
        for raw in ["nick!user@host", "irc.example.org", "nick"] {
            let p = Prefix::parse(raw).unwrap();
            assert_eq!(p.to_string(), raw);
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(Prefix::parse("").is_err());
    }
}
