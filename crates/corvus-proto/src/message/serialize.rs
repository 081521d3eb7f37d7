//! Message serialization: `Display` for [`Message`].

use std::fmt;

use super::tags::escape_tag_value;
use super::types::Message;

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref tags) = self.tags {
            if !tags.is_empty() {
                f.write_str("@")?;
                for (i, tag) in tags.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    f.write_str(&tag.0)?;
                    if let Some(ref value) = tag.1 {
                        f.write_str("=")?;
                        escape_tag_value(f, value)?;
                    }
                }
                f.write_str(" ")?;
            }
        }

        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        f.write_str(&self.command)?;

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            // The final param gets the trailing marker whenever required to
            // survive a parse round-trip.
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Message, Prefix, Tag};

    #[test]
    fn serialize_simple() {
        let msg = Message::new("PING", vec!["token".into()]);
        assert_eq!(msg.to_string(), "PING token");
    }

    #[test]
    fn serialize_trailing_with_spaces() {
        let msg = Message::privmsg("#chan", "hello world");
        assert_eq!(msg.to_string(), "PRIVMSG #chan :hello world");
    }

    #[test]
    fn serialize_with_prefix_and_tags() {
        let msg = Message::privmsg("#chan", "hi")
            .with_prefix(Prefix::new("nick", "user", "host"))
            .with_tags(Some(vec![Tag::new("time", Some("x".into()))]));
        assert_eq!(msg.to_string(), "@time=x :nick!user@host PRIVMSG #chan hi");
    }

    #[test]
    fn serialize_empty_trailing() {
        let msg = Message::new("TOPIC", vec!["#ch".into(), String::new()]);
        assert_eq!(msg.to_string(), "TOPIC #ch :");
    }

    #[test]
    fn parse_serialize_round_trip() {
        for raw in [
            "PING token",
            "PRIVMSG #chan :hello world",
            ":irc.test 001 alice :Welcome to the network",
            "@time=2023-01-01T00:00:00.000Z :n!u@h PRIVMSG #a :tagged",
            ":001AAAAAB QUIT :ping timeout",
            "CAP REQ :server-time sasl",
        ] {
            let msg: Message = raw.parse().unwrap();
            assert_eq!(msg.to_string(), raw, "round trip failed for {raw}");
            // And the canonical form survives a second pass.
            let again: Message = msg.to_string().parse().unwrap();
            assert_eq!(again, msg);
        }
    }

    #[test]
    fn escaped_tag_value_round_trip() {
        let msg = Message::ping("x").with_tag("note", Some("a b;c".into()));
        let rendered = msg.to_string();
        assert_eq!(rendered, "@note=a\\sb\\:c PING x");
        let parsed: Message = rendered.parse().unwrap();
        assert_eq!(parsed.tag_value("note"), Some("a b;c"));
    }
}
