//! corvus-proto - IRC protocol library.
//!
//! Parsing and encoding of the IRC line format (RFC 1459/2812) with IRCv3
//! message tags, plus the protocol-level building blocks shared by client
//! and server-to-server links: numerics, capability negotiation, channel
//! and user mode grammar, SASL payload handling, and ISUPPORT tokens.
//!
//! # Example
//!
//! ```
//! use corvus_proto::Message;
//!
//! let msg: Message = "@time=2024-01-01T00:00:00.000Z :nick!u@h PRIVMSG #chan :hi"
//!     .parse()
//!     .unwrap();
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.arg(0), Some("#chan"));
//! assert_eq!(msg.tag_value("time"), Some("2024-01-01T00:00:00.000Z"));
//! ```

pub mod caps;
pub mod casemap;
pub mod chan;
pub mod colors;
pub mod error;
pub mod hostmask;
pub mod isupport;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod mode;
pub mod nick;
pub mod prefix;
pub mod response;
pub mod sasl;

pub use caps::{CapReqOutcome, CapSet, Capability, SERVER_CAPS, find_capability};
pub use casemap::{irc_eq, irc_to_lower};
pub use chan::ChannelExt;
pub use error::{MessageParseError, ProtocolError};
pub use hostmask::matches_hostmask;
pub use isupport::IsupportBuilder;
#[cfg(feature = "tokio")]
pub use line::{Frame, IrcCodec};
pub use message::{Message, Tag};
pub use mode::{ChannelModeSpec, ModeChange, ModeClass, ModeParseError};
pub use nick::is_valid_nick;
pub use prefix::Prefix;
pub use response::Response;

/// Maximum IRC line length in bytes, excluding tags (RFC 2812 + IRCv3).
pub const MAX_LINE_LEN: usize = 512;

/// Maximum length of the tags section in bytes, including the leading `@`.
pub const MAX_TAGS_LEN: usize = 8191;

/// Length of a TS6 server ID.
pub const SID_LEN: usize = 3;

/// Length of a TS6 user ID (`SID` + 6 unique characters).
pub const UID_LEN: usize = 9;

/// Format a timestamp as an IRCv3 `server-time` tag value.
///
/// Produces `YYYY-MM-DDThh:mm:ss.sssZ` in UTC.
pub fn server_time_tag(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_time_format() {
        let ts = chrono::DateTime::from_timestamp(1_700_000_000, 123_000_000).unwrap();
        assert_eq!(server_time_tag(ts), "2023-11-14T22:13:20.123Z");
    }
}
