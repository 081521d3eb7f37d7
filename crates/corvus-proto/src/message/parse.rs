//! Message parsing: `FromStr` for [`Message`].

use std::str::FromStr;

use crate::error::MessageParseError;
use crate::prefix::Prefix;
use crate::MAX_TAGS_LEN;

use super::tags::unescape_tag_value;
use super::types::{Message, Tag};

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let mut rest = s.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }
        if rest.contains('\r') || rest.contains('\n') {
            return Err(MessageParseError::EmbeddedCrlf);
        }

        // Tags section: '@' up to the first space.
        let tags = if let Some(tail) = rest.strip_prefix('@') {
            let (raw_tags, after) = tail
                .split_once(' ')
                .ok_or(MessageParseError::MissingCommand)?;
            if raw_tags.len() + 1 > MAX_TAGS_LEN {
                return Err(MessageParseError::TagsTooLong { limit: MAX_TAGS_LEN });
            }
            rest = after.trim_start_matches(' ');
            Some(parse_tags(raw_tags))
        } else {
            None
        };

        // Prefix section: ':' up to the first space.
        let prefix = if let Some(tail) = rest.strip_prefix(':') {
            let (raw_prefix, after) = tail
                .split_once(' ')
                .ok_or(MessageParseError::MissingCommand)?;
            rest = after.trim_start_matches(' ');
            Some(Prefix::parse(raw_prefix)?)
        } else {
            None
        };

        // Command token.
        let (command, mut rest) = match rest.split_once(' ') {
            Some((cmd, after)) => (cmd, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(MessageParseError::MissingCommand);
        }
        if !command.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MessageParseError::InvalidCommand(command.to_string()));
        }

        // Parameters: space-separated until a ':' trailing marker.
        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Message {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}

fn parse_tags(raw: &str) -> Vec<Tag> {
    raw.split(';')
        .filter(|s| !s.is_empty())
        .map(|tag| {
            let mut iter = tag.splitn(2, '=');
            let key = iter.next().unwrap_or("");
            let value = iter.next().map(unescape_tag_value);
            Tag(key.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_ping() {
        let msg: Message = "PING :server\r\n".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["server"]);
    }

    #[test]
    fn parse_privmsg_with_prefix() {
        let msg: Message = ":nick!user@host PRIVMSG #channel :Hello, world!\r\n"
            .parse()
            .unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.source_nickname(), Some("nick"));
        assert_eq!(msg.params, vec!["#channel", "Hello, world!"]);
    }

    #[test]
    fn parse_with_tags() {
        let msg: Message = "@time=2023-01-01T00:00:00Z;msgid=abc123 :nick PRIVMSG #ch :Hi"
            .parse()
            .unwrap();
        assert_eq!(msg.tag_value("time"), Some("2023-01-01T00:00:00Z"));
        assert_eq!(msg.tag_value("msgid"), Some("abc123"));
    }

    #[test]
    fn parse_escaped_tag_value() {
        let msg: Message = "@key=value\\swith\\sspace PING :test".parse().unwrap();
        assert_eq!(msg.tag_value("key"), Some("value with space"));
    }

    #[test]
    fn parse_lowercase_command() {
        let msg: Message = "privmsg #ch :hi".parse().unwrap();
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[test]
    fn parse_numeric() {
        let msg: Message = ":server 001 nick :Welcome to IRC".parse().unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["nick", "Welcome to IRC"]);
    }

    #[test]
    fn parse_middle_and_trailing() {
        let msg: Message = "USER guest 0 * :Real Name".parse().unwrap();
        assert_eq!(msg.params, vec!["guest", "0", "*", "Real Name"]);
    }

    #[test]
    fn parse_empty_trailing() {
        let msg: Message = "TOPIC #ch :".parse().unwrap();
        assert_eq!(msg.params, vec!["#ch", ""]);
    }

    #[test]
    fn parse_empty_message() {
        assert_eq!(
            "".parse::<Message>().unwrap_err(),
            MessageParseError::EmptyMessage
        );
        assert_eq!(
            "\r\n".parse::<Message>().unwrap_err(),
            MessageParseError::EmptyMessage
        );
    }

    #[test]
    fn parse_missing_command_after_prefix() {
        assert!(":prefix".parse::<Message>().is_err());
    }

    #[test]
    fn parse_rejects_invalid_command_token() {
        assert!("PRIV/MSG #a :x".parse::<Message>().is_err());
    }

    #[test]
    fn parse_extra_spaces_between_params() {
        let msg: Message = "MODE  #chan  +o   nick".parse().unwrap();
        assert_eq!(msg.params, vec!["#chan", "+o", "nick"]);
    }

    #[test]
    fn parse_valueless_tag() {
        let msg: Message = "@account-tag PING :x".parse().unwrap();
        assert!(msg.tags.as_ref().unwrap().iter().any(|t| t.0 == "account-tag"));
        assert_eq!(msg.tag_value("account-tag"), None);
    }
}
