//! SASL payload handling.
//!
//! `AUTHENTICATE` payloads arrive base64-encoded in chunks of at most 400
//! bytes; a chunk of exactly 400 bytes signals continuation and a lone `+`
//! is the empty payload. The decoded, accumulated payload is capped at
//! 8192 bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

/// Maximum length of a single AUTHENTICATE chunk.
pub const MAX_CHUNK: usize = 400;

/// Maximum accumulated payload size in bytes.
pub const MAX_TOTAL: usize = 8192;

/// Errors from chunk accumulation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaslBufferError {
    #[error("sasl payload too long")]
    TooLong,
    #[error("invalid base64 payload")]
    InvalidBase64,
}

/// Accumulates chunked AUTHENTICATE payloads.
#[derive(Debug, Default)]
pub struct SaslBuffer {
    buf: String,
}

impl SaslBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one AUTHENTICATE argument.
    ///
    /// Returns `Ok(None)` while more chunks are expected, or the decoded
    /// payload once a final chunk arrives. `+` stands for an empty chunk.
    pub fn push(&mut self, chunk: &str) -> Result<Option<Vec<u8>>, SaslBufferError> {
        if chunk.len() > MAX_CHUNK {
            return Err(SaslBufferError::TooLong);
        }

        if chunk != "+" {
            self.buf.push_str(chunk);
            if self.buf.len() > MAX_TOTAL {
                self.buf.clear();
                return Err(SaslBufferError::TooLong);
            }
        }

        // An exactly-full chunk promises a follow-up.
        if chunk.len() == MAX_CHUNK {
            return Ok(None);
        }

        let payload = std::mem::take(&mut self.buf);
        if payload.is_empty() {
            return Ok(Some(Vec::new()));
        }
        BASE64
            .decode(payload.as_bytes())
            .map(Some)
            .map_err(|_| SaslBufferError::InvalidBase64)
    }

    /// Discard any buffered chunks (client abort).
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

/// Credentials carried by a SASL PLAIN payload.
#[derive(Debug, PartialEq, Eq)]
pub struct PlainCredentials {
    pub authzid: String,
    pub authcid: String,
    pub password: String,
}

/// Parse a PLAIN payload: `authzid NUL authcid NUL password`.
pub fn parse_plain(payload: &[u8]) -> Option<PlainCredentials> {
    let parts: Vec<&[u8]> = payload.split(|&b| b == 0).collect();
    if parts.len() != 3 {
        return None;
    }
    let authcid = String::from_utf8(parts[1].to_vec()).ok()?;
    if authcid.is_empty() {
        return None;
    }
    Some(PlainCredentials {
        authzid: String::from_utf8(parts[0].to_vec()).ok()?,
        authcid,
        password: String::from_utf8(parts[2].to_vec()).ok()?,
    })
}

/// Encode a server challenge for the wire.
pub fn encode_challenge(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "+".to_string()
    } else {
        BASE64.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        BASE64.encode(s.as_bytes())
    }

    #[test]
    fn single_chunk() {
        let mut buf = SaslBuffer::new();
        let out = buf.push(&b64("\0alice\0secret")).unwrap().unwrap();
        assert_eq!(out, b"\0alice\0secret");
    }

    #[test]
    fn empty_chunk() {
        let mut buf = SaslBuffer::new();
        assert_eq!(buf.push("+").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn continuation_chunks() {
        // Build a payload whose base64 encoding is longer than one chunk.
        let long = "x".repeat(450);
        let encoded = b64(&long);
        let (first, rest) = encoded.split_at(MAX_CHUNK);

        let mut buf = SaslBuffer::new();
        assert_eq!(buf.push(first).unwrap(), None);
        let out = buf.push(rest).unwrap().unwrap();
        assert_eq!(out, long.as_bytes());
    }

    #[test]
    fn total_cap_enforced() {
        let mut buf = SaslBuffer::new();
        let chunk = "A".repeat(MAX_CHUNK);
        for _ in 0..(MAX_TOTAL / MAX_CHUNK) {
            assert_eq!(buf.push(&chunk).unwrap(), None);
        }
        // One more full chunk pushes past the cap.
        assert_eq!(buf.push(&chunk).unwrap_err(), SaslBufferError::TooLong);
    }

    #[test]
    fn oversized_chunk_rejected() {
        let mut buf = SaslBuffer::new();
        let chunk = "A".repeat(MAX_CHUNK + 1);
        assert_eq!(buf.push(&chunk).unwrap_err(), SaslBufferError::TooLong);
    }

    #[test]
    fn plain_parsing() {
        let creds = parse_plain(b"\0alice\0secret").unwrap();
        assert_eq!(creds.authzid, "");
        assert_eq!(creds.authcid, "alice");
        assert_eq!(creds.password, "secret");

        assert!(parse_plain(b"no-nuls-here").is_none());
        assert!(parse_plain(b"\0\0pass").is_none());
    }

    #[test]
    fn challenge_encoding() {
        assert_eq!(encode_challenge(b""), "+");
        assert_eq!(encode_challenge(b"hi"), "aGk=");
    }
}
