//! UID generation for TS6-style user identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates unique user IDs (UIDs) in TS6 format.
///
/// Format: SID (3 chars) + client ID (6 chars base36) = 9 chars total,
/// e.g. `001AAAAAB`.
pub struct UidGenerator {
    sid: String,
    counter: AtomicU64,
}

impl UidGenerator {
    /// Create a new UID generator for the given server ID.
    ///
    /// The first counter values are reserved for service pseudo-users
    /// (`AAAAA?`), so client UIDs start at `AAAABA`.
    pub fn new(sid: String) -> Self {
        Self {
            sid,
            counter: AtomicU64::new(36),
        }
    }

    /// Generate the next unique UID.
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.sid, base36_encode_6(n))
    }

    /// The UID of the service pseudo-user with the given suffix character.
    pub fn service_uid(sid: &str, suffix: char) -> String {
        format!("{}AAAAA{}", sid, suffix)
    }
}

/// Encode a number as a 6-character base36 string.
fn base36_encode_6(mut n: u64) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut result = [b'A'; 6];

    for i in (0..6).rev() {
        result[i] = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_generation_skips_service_block() {
        let generator = UidGenerator::new("001".to_string());
        assert_eq!(generator.next(), "001AAAABA");
        assert_eq!(generator.next(), "001AAAABB");
    }

    #[test]
    fn service_uids() {
        assert_eq!(UidGenerator::service_uid("001", 'A'), "001AAAAAA");
        assert_eq!(UidGenerator::service_uid("042", 'F'), "042AAAAAF");
    }

    #[test]
    fn base36_encoding() {
        assert_eq!(base36_encode_6(0), "AAAAAA");
        assert_eq!(base36_encode_6(1), "AAAAAB");
        assert_eq!(base36_encode_6(35), "AAAAA9");
        assert_eq!(base36_encode_6(36), "AAAABA");
    }
}
