//! Tokio codec for framed IRC lines.
//!
//! Splits the byte stream on CRLF (tolerating bare LF), enforces the line
//! and tag length limits, and parses each line into a [`Message`]. Parse
//! failures are surfaced as [`Frame::Invalid`] items rather than stream
//! errors so the connection task can apply its own bad-frame policy.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MessageParseError;
use crate::message::Message;
use crate::{MAX_LINE_LEN, MAX_TAGS_LEN};

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A well-formed message.
    Message(Message),
    /// A mis-framed or unparseable line, kept for diagnostics.
    Invalid {
        line: String,
        error: MessageParseError,
    },
}

/// Codec implementing the IRC line format with IRCv3 tag limits.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// Consecutive invalid frames seen since the last good one.
    bad_frames: u32,
}

impl IrcCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive invalid frames since the last well-formed one.
    pub fn consecutive_bad_frames(&self) -> u32 {
        self.bad_frames
    }

    fn classify(&mut self, line: &str) -> Frame {
        // Length limits: tags have their own budget; the rest of the line
        // counts against the classic 512-byte cap (including CRLF).
        let (tags_len, body_len) = match line.strip_prefix('@') {
            Some(rest) => match rest.split_once(' ') {
                Some((tags, body)) => (tags.len() + 1, body.len()),
                None => (line.len(), 0),
            },
            None => (0, line.len()),
        };

        let error = if tags_len > MAX_TAGS_LEN {
            Some(MessageParseError::TagsTooLong { limit: MAX_TAGS_LEN })
        } else if body_len + 2 > MAX_LINE_LEN {
            Some(MessageParseError::LineTooLong { limit: MAX_LINE_LEN })
        } else {
            None
        };

        if let Some(error) = error {
            self.bad_frames += 1;
            return Frame::Invalid {
                line: line.to_string(),
                error,
            };
        }

        match line.parse::<Message>() {
            Ok(msg) => {
                self.bad_frames = 0;
                Frame::Message(msg)
            }
            Err(error) => {
                self.bad_frames += 1;
                Frame::Invalid {
                    line: line.to_string(),
                    error,
                }
            }
        }
    }
}

impl Decoder for IrcCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                // Refuse to buffer unbounded garbage with no delimiter.
                if src.len() > MAX_TAGS_LEN + MAX_LINE_LEN {
                    let garbage = src.split_to(src.len());
                    drop(garbage);
                    self.bad_frames += 1;
                    return Ok(Some(Frame::Invalid {
                        line: String::new(),
                        error: MessageParseError::LineTooLong { limit: MAX_LINE_LEN },
                    }));
                }
                return Ok(None);
            };

            let mut line = src.split_to(pos + 1);
            // Drop the LF and an optional preceding CR.
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.is_empty() {
                continue;
            }

            let text = String::from_utf8_lossy(&line).into_owned();
            return Ok(Some(self.classify(&text)));
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = std::io::Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = msg.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut IrcCodec, bytes: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = codec.decode(&mut buf) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn decode_crlf_and_lf() {
        let mut codec = IrcCodec::new();
        let frames = decode_all(&mut codec, b"PING a\r\nPING b\n");
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Message(m) if m.arg(0) == Some("a")));
        assert!(matches!(&frames[1], Frame::Message(m) if m.arg(0) == Some("b")));
    }

    #[test]
    fn partial_line_buffers() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #chan :par"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"tial\r\n");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame, Frame::Message(m) if m.trailing() == Some("partial")));
    }

    #[test]
    fn empty_lines_skipped() {
        let mut codec = IrcCodec::new();
        let frames = decode_all(&mut codec, b"\r\n\r\nPING x\r\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn line_at_512_accepted_513_rejected() {
        let mut codec = IrcCodec::new();

        // 512 bytes including CRLF: body of 510.
        let body = format!("PRIVMSG #c :{}", "a".repeat(510 - 12));
        assert_eq!(body.len() + 2, 512);
        let frames = decode_all(&mut codec, format!("{}\r\n", body).as_bytes());
        assert!(matches!(frames[0], Frame::Message(_)));
        assert_eq!(codec.consecutive_bad_frames(), 0);

        // One byte more is rejected.
        let body = format!("PRIVMSG #c :{}", "a".repeat(511 - 12));
        let frames = decode_all(&mut codec, format!("{}\r\n", body).as_bytes());
        assert!(matches!(
            frames[0],
            Frame::Invalid {
                error: MessageParseError::LineTooLong { .. },
                ..
            }
        ));
        assert_eq!(codec.consecutive_bad_frames(), 1);
    }

    #[test]
    fn tags_do_not_count_against_line_budget() {
        let mut codec = IrcCodec::new();
        let tags = format!("@x={} ", "t".repeat(600));
        let frames = decode_all(&mut codec, format!("{}PING a\r\n", tags).as_bytes());
        assert!(matches!(frames[0], Frame::Message(_)));
    }

    #[test]
    fn oversized_tags_rejected() {
        let mut codec = IrcCodec::new();
        let tags = format!("@x={} ", "t".repeat(MAX_TAGS_LEN));
        let frames = decode_all(&mut codec, format!("{}PING a\r\n", tags).as_bytes());
        assert!(matches!(
            frames[0],
            Frame::Invalid {
                error: MessageParseError::TagsTooLong { .. },
                ..
            }
        ));
    }

    #[test]
    fn bad_frame_counter_resets_on_good_frame() {
        let mut codec = IrcCodec::new();
        decode_all(&mut codec, b":only-a-prefix\r\n");
        assert_eq!(codec.consecutive_bad_frames(), 1);
        decode_all(&mut codec, b"PING x\r\n");
        assert_eq!(codec.consecutive_bad_frames(), 0);
    }

    #[test]
    fn encode_appends_crlf() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::privmsg("#a", "hello world"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #a :hello world\r\n");
    }
}
