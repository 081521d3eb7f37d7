//! IRCv3 capability negotiation.
//!
//! The server advertises a fixed capability table; each connection tracks
//! its own enabled subset. `CAP REQ` is atomic: one unknown name rejects
//! the whole request.

use std::collections::HashSet;

/// A server-advertised capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capability {
    /// Capability name as advertised in `CAP LS`.
    pub name: &'static str,
    /// Value suffix advertised to `CAP LS 302` clients (`name=value`).
    pub value: Option<&'static str>,
}

/// Every capability this server knows how to honor.
pub const SERVER_CAPS: &[Capability] = &[
    Capability { name: "account-notify", value: None },
    Capability { name: "account-tag", value: None },
    Capability { name: "away-notify", value: None },
    Capability { name: "batch", value: None },
    Capability { name: "cap-notify", value: None },
    Capability { name: "chathistory", value: None },
    Capability { name: "echo-message", value: None },
    Capability { name: "extended-join", value: None },
    Capability { name: "invite-notify", value: None },
    Capability { name: "message-tags", value: None },
    Capability { name: "multi-prefix", value: None },
    Capability { name: "sasl", value: Some("PLAIN,EXTERNAL") },
    Capability { name: "server-time", value: None },
    Capability { name: "setname", value: None },
    Capability { name: "userhost-in-names", value: None },
];

/// Look up a known capability by name.
pub fn find_capability(name: &str) -> Option<&'static Capability> {
    SERVER_CAPS.iter().find(|c| c.name == name)
}

/// Outcome of a `CAP REQ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapReqOutcome {
    /// The whole request was applied; echo it back in the ACK.
    Ack,
    /// At least one name was unknown or not advertised; nothing changed.
    Nak,
}

/// Per-connection capability state.
#[derive(Debug, Default, Clone)]
pub struct CapSet {
    enabled: HashSet<String>,
    /// Whether negotiation is open (between `CAP LS`/`REQ` and `CAP END`).
    pub negotiating: bool,
    /// CAP protocol version (301, or 302 when requested).
    pub version: u32,
}

impl CapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a capability is enabled on this connection.
    pub fn has(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Names currently enabled, sorted for stable LIST output.
    pub fn enabled(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.enabled.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The raw enabled set (for handing to the broker at registration).
    pub fn enabled_set(&self) -> HashSet<String> {
        self.enabled.clone()
    }

    /// Apply a `CAP REQ` list atomically against the advertised set.
    ///
    /// `-`-prefixed names disable. Any name outside `advertised` NAKs the
    /// whole request and leaves the set untouched.
    pub fn request(&mut self, advertised: &HashSet<&'static str>, req: &str) -> CapReqOutcome {
        let mut changes: Vec<(bool, &str)> = Vec::new();
        for token in req.split_ascii_whitespace() {
            let (enable, name) = match token.strip_prefix('-') {
                Some(name) => (false, name),
                None => (true, token),
            };
            if name.is_empty() || !advertised.contains(name) {
                return CapReqOutcome::Nak;
            }
            changes.push((enable, name));
        }

        for (enable, name) in changes {
            if enable {
                self.enabled.insert(name.to_string());
            } else {
                self.enabled.remove(name);
            }
        }
        CapReqOutcome::Ack
    }

    /// Force-enable a capability (used when merging S2S-learned state).
    pub fn enable(&mut self, name: &str) {
        self.enabled.insert(name.to_string());
    }
}

/// Render the `CAP LS` body for the given advertised names.
///
/// Version 302 clients receive `name=value` tokens where a value exists.
pub fn ls_body(advertised: &[&'static Capability], version: u32) -> String {
    let mut out = String::new();
    for (i, cap) in advertised.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(cap.name);
        if version >= 302 {
            if let Some(value) = cap.value {
                out.push('=');
                out.push_str(value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertised() -> HashSet<&'static str> {
        SERVER_CAPS.iter().map(|c| c.name).collect()
    }

    #[test]
    fn req_ack() {
        let mut caps = CapSet::new();
        let outcome = caps.request(&advertised(), "server-time sasl");
        assert_eq!(outcome, CapReqOutcome::Ack);
        assert!(caps.has("server-time"));
        assert!(caps.has("sasl"));
    }

    #[test]
    fn req_unknown_naks_whole_request() {
        let mut caps = CapSet::new();
        let outcome = caps.request(&advertised(), "server-time bogus-cap");
        assert_eq!(outcome, CapReqOutcome::Nak);
        assert!(!caps.has("server-time"));
    }

    #[test]
    fn req_minus_disables() {
        let mut caps = CapSet::new();
        caps.request(&advertised(), "server-time echo-message");
        let outcome = caps.request(&advertised(), "-echo-message");
        assert_eq!(outcome, CapReqOutcome::Ack);
        assert!(caps.has("server-time"));
        assert!(!caps.has("echo-message"));
    }

    #[test]
    fn ls_values_gated_on_302() {
        let caps: Vec<&'static Capability> = SERVER_CAPS.iter().collect();
        let v301 = ls_body(&caps, 301);
        let v302 = ls_body(&caps, 302);
        assert!(!v301.contains("sasl="));
        assert!(v302.contains("sasl=PLAIN,EXTERNAL"));
    }
}
