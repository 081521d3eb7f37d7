//! Registration state machine.
//!
//! Drives a connection from accept through CAP negotiation, NICK/USER,
//! optional PASS and SASL, to full registration. The phase is derived
//! from the data received so far; completing CAP negotiation never
//! regresses NICK/USER progress.

use std::collections::HashSet;

use corvus_proto::CapSet;
use corvus_proto::sasl::SaslBuffer;

/// Registration phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    None,
    CapNegotiating,
    NickReceived,
    UserReceived,
    NickAndUserReceived,
    Registered,
}

/// In-flight SASL exchange state.
#[derive(Debug, Default)]
pub struct SaslSession {
    /// Selected mechanism name, once AUTHENTICATE <mech> was seen.
    pub mechanism: Option<String>,
    /// Chunk accumulator for the client response.
    pub buffer: SaslBuffer,
    /// Whether this connection already completed SASL.
    pub done: bool,
    /// When the exchange started, for the overall SASL timeout.
    pub started: Option<std::time::Instant>,
}

/// Data accumulated during the connection handshake.
///
/// Post-registration, `nick`, `caps`, `account` and `is_oper` are kept in
/// sync with the authoritative [`crate::state::User`] record so the
/// dispatcher can gate commands without taking user locks.
#[derive(Debug)]
pub struct Handshake {
    pub nick: Option<String>,
    pub ident: Option<String>,
    pub realname: Option<String>,
    /// Password received via PASS, recorded before NICK/USER.
    pub password: Option<String>,
    /// Per-connection capability state.
    pub caps: CapSet,
    /// SASL exchange state.
    pub sasl: SaslSession,
    /// Account established by SASL before registration completes.
    pub account: Option<String>,
    /// Whether the transport is TLS.
    pub is_tls: bool,
    /// TLS client certificate fingerprint (SHA-256 hex).
    pub certfp: Option<String>,
    /// Peer address of the transport.
    pub peer_ip: std::net::IpAddr,
    /// Real IP/host supplied by a trusted WEBIRC gateway.
    pub webirc_ip: Option<String>,
    pub webirc_host: Option<String>,
    /// Mirror of the registered user's oper flag for dispatch gating.
    pub is_oper: bool,
    registered: bool,
}

impl Handshake {
    pub fn new(is_tls: bool, certfp: Option<String>, peer_ip: std::net::IpAddr) -> Self {
        Self {
            nick: None,
            ident: None,
            realname: None,
            password: None,
            caps: CapSet::new(),
            sasl: SaslSession::default(),
            account: None,
            is_tls,
            certfp,
            peer_ip,
            webirc_ip: None,
            webirc_host: None,
            is_oper: false,
            registered: false,
        }
    }

    /// The current phase, derived from accumulated data.
    pub fn phase(&self) -> Phase {
        if self.registered {
            return Phase::Registered;
        }
        match (self.nick.is_some(), self.ident.is_some()) {
            (true, true) => Phase::NickAndUserReceived,
            (true, false) => Phase::NickReceived,
            (false, true) => Phase::UserReceived,
            (false, false) if self.caps.negotiating => Phase::CapNegotiating,
            (false, false) => Phase::None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Whether all registration requirements are met: NICK and USER seen,
    /// no CAP negotiation outstanding, and no SASL exchange mid-flight.
    pub fn can_register(&self) -> bool {
        !self.registered
            && self.nick.is_some()
            && self.ident.is_some()
            && !self.caps.negotiating
            && self.sasl.mechanism.is_none()
    }

    /// Mark the connection registered. The caller has already validated
    /// PASS and created the user record.
    pub fn complete(&mut self) {
        self.registered = true;
    }

    /// The nick for error replies, `*` before NICK.
    pub fn nick_or_star(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    /// Snapshot of the negotiated capability names.
    pub fn cap_names(&self) -> HashSet<String> {
        self.caps.enabled_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_progression() {
        let mut hs = Handshake::new(false, None, std::net::IpAddr::from([127, 0, 0, 1]));
        assert_eq!(hs.phase(), Phase::None);

        hs.caps.negotiating = true;
        assert_eq!(hs.phase(), Phase::CapNegotiating);

        hs.nick = Some("alice".into());
        assert_eq!(hs.phase(), Phase::NickReceived);

        hs.ident = Some("alice".into());
        assert_eq!(hs.phase(), Phase::NickAndUserReceived);
        assert!(!hs.can_register(), "CAP negotiation still open");

        hs.caps.negotiating = false;
        assert!(hs.can_register());

        hs.complete();
        assert_eq!(hs.phase(), Phase::Registered);
        assert!(!hs.can_register());
    }

    #[test]
    fn user_before_nick() {
        let mut hs = Handshake::new(false, None, std::net::IpAddr::from([127, 0, 0, 1]));
        hs.ident = Some("u".into());
        assert_eq!(hs.phase(), Phase::UserReceived);
    }

    #[test]
    fn sasl_in_flight_blocks_registration() {
        let mut hs = Handshake::new(true, None, std::net::IpAddr::from([127, 0, 0, 1]));
        hs.nick = Some("alice".into());
        hs.ident = Some("alice".into());
        hs.sasl.mechanism = Some("PLAIN".into());
        assert!(!hs.can_register());
        hs.sasl.mechanism = None;
        hs.sasl.done = true;
        assert!(hs.can_register());
    }
}
