//! Hostname cloaking.
//!
//! Replaces a user's real host with an HMAC-SHA256-derived pseudonym so
//! other users cannot recover the address, while keeping the cloak stable
//! per source host (ban masks keep working).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;

type HmacSha256 = Hmac<Sha256>;

fn hmac_hex(secret: &str, input: &str, len: usize) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(input.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(len);
    for byte in digest.iter() {
        if out.len() >= len {
            break;
        }
        out.push_str(&format!("{:02x}", byte));
    }
    out.truncate(len);
    out
}

/// Cloak an IP address: `<hmac8>.<suffix>`.
pub fn cloak_ip(ip: &IpAddr, secret: &str, suffix: &str) -> String {
    format!("{}.{}", hmac_hex(secret, &ip.to_string(), 8), suffix)
}

/// Cloak a resolved hostname, keeping the public suffix readable:
/// `a1b2c3d4.example.com` for `dsl-1-2.example.com`.
pub fn cloak_hostname(host: &str, secret: &str) -> String {
    let hashed = hmac_hex(secret, host, 8);
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        let kept = &parts[parts.len() - 2..];
        format!("{}.{}", hashed, kept.join("."))
    } else {
        hashed
    }
}

/// Derive the visible host for a connecting user.
pub fn visible_host(host: &str, ip: &str, secret: &str, suffix: &str, enabled: bool) -> String {
    if !enabled {
        return host.to_string();
    }
    match ip.parse::<IpAddr>() {
        Ok(addr) if host == ip || host.is_empty() => cloak_ip(&addr, secret, suffix),
        _ => cloak_hostname(host, secret),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn ip_cloak_is_stable_and_suffixed() {
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        let a = cloak_ip(&ip, SECRET, "ip");
        let b = cloak_ip(&ip, SECRET, "ip");
        assert_eq!(a, b);
        assert!(a.ends_with(".ip"));
        assert_eq!(a.split('.').next().unwrap().len(), 8);
    }

    #[test]
    fn different_ips_cloak_differently() {
        let a = cloak_ip(&"192.0.2.1".parse().unwrap(), SECRET, "ip");
        let b = cloak_ip(&"192.0.2.2".parse().unwrap(), SECRET, "ip");
        assert_ne!(a, b);
    }

    #[test]
    fn hostname_keeps_public_suffix() {
        let cloaked = cloak_hostname("dsl-1-2.broadband.example.com", SECRET);
        assert!(cloaked.ends_with(".example.com"));
        assert!(!cloaked.contains("dsl-1-2"));
    }

    #[test]
    fn disabled_cloaking_passes_through() {
        assert_eq!(
            visible_host("host.example", "192.0.2.1", SECRET, "ip", false),
            "host.example"
        );
    }

    #[test]
    fn unresolved_host_cloaks_ip() {
        let visible = visible_host("192.0.2.1", "192.0.2.1", SECRET, "ip", true);
        assert!(visible.ends_with(".ip"));
    }
}
