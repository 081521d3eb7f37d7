//! The owned IRC message type.

use crate::prefix::Prefix;
use crate::response::Response;

/// An IRCv3 message tag.
///
/// Tags are key-value pairs attached to a message. The value is optional;
/// client-only tags carry a `+` prefix on the key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag(pub String, pub Option<String>);

impl Tag {
    /// Create a new tag with a key and optional value.
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Tag(key.into(), value)
    }

    /// Whether this is a client-only tag (`+`-prefixed key).
    pub fn is_client_only(&self) -> bool {
        self.0.starts_with('+')
    }
}

/// An owned IRC message.
///
/// Contains optional IRCv3 tags, an optional prefix/source, the command
/// token (uppercased at parse time for commands, or a three-digit numeric),
/// and its positional parameters. The final parameter may contain spaces;
/// serialization re-adds the `:` trailing marker when needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// IRCv3 message tags (e.g. `time`, `account`).
    pub tags: Option<Vec<Tag>>,
    /// Message prefix/source.
    pub prefix: Option<Prefix>,
    /// The command token, uppercased (`PRIVMSG`, `001`, ...).
    pub command: String,
    /// Positional parameters, trailing included as the last element.
    pub params: Vec<String>,
}

impl Message {
    /// Create a message from a command token and parameters.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Message {
            tags: None,
            prefix: None,
            command: command.into().to_ascii_uppercase(),
            params,
        }
    }

    /// Create a numeric reply from a server.
    pub fn numeric(server_name: &str, response: Response, params: Vec<String>) -> Self {
        Message {
            tags: None,
            prefix: Some(Prefix::ServerName(server_name.to_string())),
            command: response.code_str().to_string(),
            params,
        }
    }

    /// Create a PRIVMSG to a target.
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("PRIVMSG", vec![target.into(), text.into()])
    }

    /// Create a NOTICE to a target.
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("NOTICE", vec![target.into(), text.into()])
    }

    /// Create a PING with a token.
    pub fn ping(token: impl Into<String>) -> Self {
        Message::new("PING", vec![token.into()])
    }

    /// Create a PONG with the responding server and token.
    pub fn pong(server: impl Into<String>, token: impl Into<String>) -> Self {
        Message::new("PONG", vec![server.into(), token.into()])
    }

    /// Create an ERROR frame (server-initiated close).
    pub fn error(text: impl Into<String>) -> Self {
        Message::new("ERROR", vec![text.into()])
    }

    /// Get parameter `i`, if present.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(String::as_str)
    }

    /// Get parameter `i` or an empty string.
    pub fn arg_or_empty(&self, i: usize) -> &str {
        self.arg(i).unwrap_or("")
    }

    /// The trailing (last) parameter, if any.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Get the value of an IRCv3 tag by key.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .as_ref()?
            .iter()
            .find(|Tag(k, _)| k == key)
            .and_then(|Tag(_, v)| v.as_deref())
    }

    /// The nickname from the message prefix, if the prefix is a user mask.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(|p| match p {
            Prefix::Nickname(nick, _, _) => Some(nick.as_str()),
            Prefix::ServerName(_) => None,
        })
    }

    /// The raw source token (server name, SID, UID, or nick), if any.
    pub fn source(&self) -> Option<&str> {
        self.prefix.as_ref().map(Prefix::name)
    }

    /// Set the prefix of this message.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Add a single IRCv3 tag to this message.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        let tag = Tag::new(key, value);
        match self.tags {
            Some(ref mut tags) => tags.push(tag),
            None => self.tags = Some(vec![tag]),
        }
        self
    }

    /// Replace the tag set of this message.
    #[must_use]
    pub fn with_tags(mut self, tags: Option<Vec<Tag>>) -> Self {
        self.tags = tags;
        self
    }

    /// A copy of this message with all tags removed.
    #[must_use]
    pub fn without_tags(&self) -> Self {
        Message {
            tags: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_uppercases() {
        let msg = Message::new("privmsg", vec!["#a".into(), "hi".into()]);
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[test]
    fn numeric_constructor() {
        let msg = Message::numeric(
            "irc.test",
            Response::RPL_WELCOME,
            vec!["alice".into(), "Welcome".into()],
        );
        assert_eq!(msg.command, "001");
        assert_eq!(msg.source(), Some("irc.test"));
    }

    #[test]
    fn tag_lookup() {
        let msg = Message::ping("x").with_tag("time", Some("now".into()));
        assert_eq!(msg.tag_value("time"), Some("now"));
        assert_eq!(msg.tag_value("account"), None);
    }

    #[test]
    fn client_only_tags() {
        assert!(Tag::new("+typing", None).is_client_only());
        assert!(!Tag::new("time", None).is_client_only());
    }
}
