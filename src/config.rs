//! Configuration loading and management.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration root.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Listener configuration.
    pub listen: ListenConfig,
    /// Optional TLS configuration for the TLS listener.
    pub tls: Option<TlsConfig>,
    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Timeouts and keepalive.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Security settings (cloaking, flood protection).
    #[serde(default)]
    pub security: SecurityConfig,
    /// Message of the Day configuration.
    #[serde(default)]
    pub motd: MotdConfig,
    /// Operator blocks.
    #[serde(default)]
    pub oper: Vec<OperBlock>,
    /// Server link blocks.
    #[serde(default)]
    pub link: Vec<LinkBlock>,
    /// WEBIRC trusted-gateway blocks.
    #[serde(default)]
    pub webirc: Vec<WebircBlock>,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
}

/// Server identity and feature switches.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, e.g. `irc.example.org`.
    pub name: String,
    /// Network name shown in ISUPPORT and the welcome line.
    pub network: String,
    /// TS6 server ID (3 characters: digit, then two alphanumerics).
    pub sid: String,
    /// Free-text description for LINKS and INFO.
    #[serde(default = "default_description")]
    pub description: String,
    /// Administrative contact shown by ADMIN.
    pub admin_email: Option<String>,
    /// Optional password all clients must supply via PASS.
    pub password: Option<String>,
    /// When set, plaintext listeners are refused at startup.
    #[serde(default)]
    pub require_tls: bool,
    /// Whether unregistered channels may be created with JOIN.
    #[serde(default = "default_true")]
    pub allow_channel_creation: bool,
    /// Capabilities to advertise; empty means all known capabilities.
    #[serde(default)]
    pub enabled_capabilities: Vec<String>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_description() -> String {
    "Corvus IRC daemon".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Listener configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListenConfig {
    /// Plaintext client listener.
    pub addr: SocketAddr,
    /// TLS client listener port (same host as `addr`).
    pub tls_port: Option<u16>,
    /// S2S listener.
    pub s2s_addr: Option<SocketAddr>,
    /// Admin surface port (interface only; consumed by the admin frontend).
    pub admin_port: Option<u16>,
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain.
    pub cert: String,
    /// Path to the PEM private key.
    pub key: String,
}

/// Resource limits, all optional with conventional defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_users")]
    pub max_users: usize,
    #[serde(default = "default_max_channels_per_user")]
    pub max_channels_per_user: usize,
    #[serde(default = "default_max_users_per_channel")]
    pub max_users_per_channel: usize,
    #[serde(default = "default_max_nick_length")]
    pub max_nick_length: usize,
    #[serde(default = "default_max_channel_length")]
    pub max_channel_length: usize,
    #[serde(default = "default_max_topic_length")]
    pub max_topic_length: usize,
    /// Outbound queue depth per connection before the peer is dropped.
    #[serde(default = "default_sendq")]
    pub max_send_queue: usize,
    /// MONITOR list entries per connection.
    #[serde(default = "default_monitor_entries")]
    pub max_monitor_entries: usize,
    /// WHOWAS entries retained per nickname.
    #[serde(default = "default_whowas_depth")]
    pub whowas_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_users: default_max_users(),
            max_channels_per_user: default_max_channels_per_user(),
            max_users_per_channel: default_max_users_per_channel(),
            max_nick_length: default_max_nick_length(),
            max_channel_length: default_max_channel_length(),
            max_topic_length: default_max_topic_length(),
            max_send_queue: default_sendq(),
            max_monitor_entries: default_monitor_entries(),
            whowas_depth: default_whowas_depth(),
        }
    }
}

fn default_max_connections() -> usize {
    4096
}
fn default_max_users() -> usize {
    4096
}
fn default_max_channels_per_user() -> usize {
    64
}
fn default_max_users_per_channel() -> usize {
    512
}
fn default_max_nick_length() -> usize {
    30
}
fn default_max_channel_length() -> usize {
    50
}
fn default_max_topic_length() -> usize {
    390
}
fn default_sendq() -> usize {
    256
}
fn default_monitor_entries() -> usize {
    100
}
fn default_whowas_depth() -> usize {
    8
}

/// Timeouts, in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds a connection may spend before completing registration.
    #[serde(default = "default_registration_timeout")]
    pub registration: u64,
    /// Keepalive PING interval after registration.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Seconds to wait for a PONG before disconnecting.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    /// Overall budget for a SASL exchange.
    #[serde(default = "default_sasl_timeout")]
    pub sasl: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            registration: default_registration_timeout(),
            ping_interval: default_ping_interval(),
            ping_timeout: default_ping_timeout(),
            sasl: default_sasl_timeout(),
        }
    }
}

fn default_registration_timeout() -> u64 {
    60
}
fn default_ping_interval() -> u64 {
    90
}
fn default_ping_timeout() -> u64 {
    120
}
fn default_sasl_timeout() -> u64 {
    60
}

/// Security settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Whether to replace real hosts with HMAC-derived cloaks.
    #[serde(default = "default_true")]
    pub cloak_hostnames: bool,
    /// Secret for the cloaking HMAC.
    #[serde(default)]
    pub cloak_secret: String,
    /// Suffix for cloaked hosts, e.g. `ip` yields `a1b2c3d4.ip`.
    #[serde(default = "default_cloak_suffix")]
    pub cloak_suffix: String,
    /// Whether flood protection is applied at all.
    #[serde(default = "default_true")]
    pub enable_flood_protection: bool,
    /// PRIVMSG/NOTICE per second per connection.
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f32,
    /// All commands per second per connection.
    #[serde(default = "default_commands_per_second")]
    pub commands_per_second: f32,
    /// New connections per minute per source IP.
    #[serde(default = "default_connections_per_minute")]
    pub connections_per_minute: u32,
    /// Consecutive unparseable frames before the connection is cut.
    #[serde(default = "default_max_bad_frames")]
    pub max_bad_frames: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cloak_hostnames: true,
            cloak_secret: String::new(),
            cloak_suffix: default_cloak_suffix(),
            enable_flood_protection: true,
            messages_per_second: default_messages_per_second(),
            commands_per_second: default_commands_per_second(),
            connections_per_minute: default_connections_per_minute(),
            max_bad_frames: default_max_bad_frames(),
        }
    }
}

fn default_cloak_suffix() -> String {
    "ip".to_string()
}
fn default_messages_per_second() -> f32 {
    4.0
}
fn default_commands_per_second() -> f32 {
    10.0
}
fn default_connections_per_minute() -> u32 {
    30
}
fn default_max_bad_frames() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

/// Message of the Day configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MotdConfig {
    /// Path to a MOTD file (one MOTD line per file line).
    pub file: Option<String>,
    /// Inline MOTD lines, used when `file` is not set.
    #[serde(default)]
    pub lines: Vec<String>,
}

impl MotdConfig {
    /// Load MOTD lines; empty means "no MOTD" (422).
    pub fn load_lines(&self) -> Vec<String> {
        if let Some(ref path) = self.file {
            match std::fs::read_to_string(path) {
                Ok(content) => return content.lines().map(|s| s.to_string()).collect(),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to read MOTD file");
                }
            }
        }
        self.lines.clone()
    }
}

/// An operator block.
#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    /// Name given to OPER.
    pub name: String,
    /// Argon2 hash of the operator password.
    pub password_hash: String,
    /// Hostmasks the operator may authenticate from; empty allows any.
    #[serde(default)]
    pub hostmasks: Vec<String>,
    /// Operator class, e.g. `admin` or `oper`.
    #[serde(default = "default_oper_class")]
    pub class: String,
}

fn default_oper_class() -> String {
    "oper".to_string()
}

/// A server link block.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// Remote server name.
    pub name: String,
    /// Password we send in our PASS.
    pub send_password: String,
    /// Password we require in their PASS.
    pub recv_password: String,
    /// Remote address for outbound connects.
    pub address: String,
    pub port: u16,
    /// Whether to connect at startup.
    #[serde(default)]
    pub autoconnect: bool,
}

/// A WEBIRC trusted-gateway block.
#[derive(Debug, Clone, Deserialize)]
pub struct WebircBlock {
    /// Password the gateway must present.
    pub password: String,
    /// Source address the gateway connects from.
    pub trusted_source: IpAddr,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub path: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(Path::new(path))?;
        Ok(toml::from_str(&content)?)
    }
}

/// Validate a loaded configuration, collecting every problem found.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() || !config.server.name.contains('.') {
        errors.push("server.name must be a dotted server name".to_string());
    }
    let sid = &config.server.sid;
    let sid_ok = sid.len() == 3
        && sid.as_bytes()[0].is_ascii_digit()
        && sid.bytes().all(|b| b.is_ascii_alphanumeric())
        && sid.chars().all(|c| !c.is_ascii_lowercase());
    if !sid_ok {
        errors.push(format!(
            "server.sid {:?} must be 3 chars: digit then uppercase alphanumerics",
            sid
        ));
    }
    if config.server.require_tls && config.tls.is_none() {
        errors.push("server.require_tls is set but no [tls] section exists".to_string());
    }
    if config.listen.tls_port.is_some() && config.tls.is_none() {
        errors.push("listen.tls_port is set but no [tls] section exists".to_string());
    }
    if config.security.cloak_hostnames && config.security.cloak_secret.len() < 16 {
        errors.push("security.cloak_secret must be at least 16 characters".to_string());
    }
    if config.limits.max_nick_length == 0 || config.limits.max_nick_length > 64 {
        errors.push("limits.max_nick_length must be between 1 and 64".to_string());
    }
    for oper in &config.oper {
        if oper.password_hash.is_empty() {
            errors.push(format!("oper block {:?} has an empty password_hash", oper.name));
        }
    }
    for link in &config.link {
        if link.name == config.server.name {
            errors.push(format!("link block {:?} points at ourselves", link.name));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        toml::from_str(
            r#"
            [server]
            name = "irc.test.net"
            network = "TestNet"
            sid = "001"

            [listen]
            addr = "127.0.0.1:6667"

            [security]
            cloak_secret = "0123456789abcdef0123456789abcdef"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn minimal_config_valid() {
        let config = minimal_config();
        assert!(validate(&config).is_ok());
        assert_eq!(config.limits.max_nick_length, 30);
        assert_eq!(config.timeouts.registration, 60);
        assert!(config.server.allow_channel_creation);
    }

    #[test]
    fn bad_sid_rejected() {
        let mut config = minimal_config();
        config.server.sid = "ab".to_string();
        assert!(validate(&config).is_err());
        config.server.sid = "A01".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn tls_port_requires_tls_section() {
        let mut config = minimal_config();
        config.listen.tls_port = Some(6697);
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("tls_port")));
    }

    #[test]
    fn weak_cloak_secret_rejected() {
        let mut config = minimal_config();
        config.security.cloak_secret = "short".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn oper_and_link_blocks_parse() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "irc.test.net"
            network = "TestNet"
            sid = "001"

            [listen]
            addr = "127.0.0.1:6667"

            [[oper]]
            name = "admin"
            password_hash = "$argon2id$..."
            hostmasks = ["*@localhost"]
            class = "admin"

            [[link]]
            name = "hub.test.net"
            send_password = "s3nd"
            recv_password = "r3cv"
            address = "10.0.0.2"
            port = 7000
            autoconnect = true

            [[webirc]]
            password = "gateway"
            trusted_source = "127.0.0.1"
            "#,
        )
        .unwrap();
        assert_eq!(config.oper.len(), 1);
        assert_eq!(config.link[0].port, 7000);
        assert!(config.link[0].autoconnect);
        assert_eq!(config.webirc.len(), 1);
    }
}
