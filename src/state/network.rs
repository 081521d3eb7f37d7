//! The Network - central shared state for the IRC server.
//!
//! Acts as the dependency container for the domain managers holding the
//! actual state. Handlers reach everything through an `Arc<Network>`.
//!
//! # Lock order (deadlock prevention)
//!
//! 1. User index (DashMap shard, during `.get()` / `.iter()`)
//! 2. Channel index (DashMap shard)
//! 3. Individual channel `RwLock`
//! 4. Individual user `RwLock`
//!
//! Never acquire in reverse order. Fan-out paths take the channel read
//! lock only, copy the member set, and release before delivering.

use std::collections::HashSet;
use std::sync::Arc;

use corvus_proto::{Capability, Message, Prefix, find_capability};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::admin::{AdminEvents, UserEvent};
use crate::broker::Broker;
use crate::config::{Config, LimitsConfig, OperBlock, SecurityConfig, TimeoutsConfig, WebircBlock};
use crate::db::Database;
use crate::s2s::LinkManager;
use crate::security::{BanManager, ConnectionThrottle, ServerBan};
use crate::services::ServiceManager;
use crate::state::{
    ChannelManager, MonitorManager, StatsTracker, Uid, UserManager, WhowasEntry, WhowasStore,
};

/// This server's identity.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub network: String,
    pub sid: String,
    pub created_at: i64,
}

/// Configuration that REHASH can swap atomically.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub description: String,
    pub motd_lines: Vec<String>,
    pub oper_blocks: Vec<OperBlock>,
    pub admin_email: Option<String>,
}

impl HotConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            description: config.server.description.clone(),
            motd_lines: config.motd.load_lines(),
            oper_blocks: config.oper.clone(),
            admin_email: config.server.admin_email.clone(),
        }
    }
}

/// Parameters for constructing a Network.
pub struct NetworkParams {
    pub config: Config,
    pub config_path: String,
    pub db: Database,
    pub registered_channels: Vec<String>,
    pub initial_bans: Vec<ServerBan>,
    pub disconnect_tx: mpsc::Sender<(Uid, String)>,
    /// Optional extension subsystems, bound once.
    pub extensions: crate::handlers::Extensions,
}

/// The central shared state container.
pub struct Network {
    pub users: UserManager,
    pub channels: ChannelManager,
    pub broker: Broker,
    pub bans: BanManager,
    pub links: LinkManager,
    pub services: ServiceManager,
    pub monitors: MonitorManager,
    pub whowas: WhowasStore,
    pub stats: Arc<StatsTracker>,
    pub admin: AdminEvents,
    pub throttle: ConnectionThrottle,

    pub info: ServerInfo,
    pub limits: LimitsConfig,
    pub timeouts: TimeoutsConfig,
    pub security: SecurityConfig,
    pub webirc_blocks: Vec<WebircBlock>,
    /// Capabilities advertised to clients.
    pub advertised_caps: Vec<&'static Capability>,
    pub server_password: Option<String>,
    pub require_tls: bool,
    pub allow_channel_creation: bool,

    pub config_path: String,
    pub hot_config: RwLock<HotConfig>,

    pub db: Database,

    /// Server-wide shutdown signal.
    pub shutdown: broadcast::Sender<()>,
    /// Disconnect queue, drained outside handler paths.
    disconnect_tx: mpsc::Sender<(Uid, String)>,
    extensions: crate::handlers::Extensions,
}

impl Network {
    pub fn new(params: NetworkParams) -> Self {
        let NetworkParams {
            config,
            config_path,
            db,
            registered_channels,
            initial_bans,
            disconnect_tx,
            extensions,
        } = params;

        let stats = Arc::new(StatsTracker::new());
        let advertised_caps: Vec<&'static Capability> =
            if config.server.enabled_capabilities.is_empty() {
                corvus_proto::SERVER_CAPS.iter().collect()
            } else {
                config
                    .server
                    .enabled_capabilities
                    .iter()
                    .filter_map(|name| find_capability(name))
                    .collect()
            };

        let (shutdown, _) = broadcast::channel(4);

        Self {
            users: UserManager::new(config.server.sid.clone()),
            channels: ChannelManager::new(registered_channels, stats.clone()),
            broker: Broker::new(disconnect_tx.clone()),
            bans: BanManager::new(initial_bans),
            links: LinkManager::new(
                config.server.sid.clone(),
                config.server.name.clone(),
                config.link.clone(),
            ),
            services: ServiceManager::new(&config.server.sid),
            monitors: MonitorManager::new(config.limits.max_monitor_entries),
            whowas: WhowasStore::new(config.limits.whowas_depth),
            stats,
            admin: AdminEvents::new(),
            throttle: ConnectionThrottle::new(config.security.connections_per_minute),
            info: ServerInfo {
                name: config.server.name.clone(),
                network: config.server.network.clone(),
                sid: config.server.sid.clone(),
                created_at: chrono::Utc::now().timestamp(),
            },
            limits: config.limits.clone(),
            timeouts: config.timeouts,
            security: config.security.clone(),
            webirc_blocks: config.webirc.clone(),
            advertised_caps,
            server_password: config.server.password.clone(),
            require_tls: config.server.require_tls,
            allow_channel_creation: config.server.allow_channel_creation,
            config_path,
            hot_config: RwLock::new(HotConfig::from_config(&config)),
            db,
            shutdown,
            disconnect_tx,
            extensions,
        }
    }

    /// The extension subsystem record bound at construction.
    pub fn extensions(&self) -> &crate::handlers::Extensions {
        &self.extensions
    }

    /// The server prefix for numerics and notices.
    pub fn server_prefix(&self) -> Prefix {
        Prefix::ServerName(self.info.name.clone())
    }

    /// The advertised capability names as a set for CAP REQ validation.
    pub fn advertised_cap_names(&self) -> HashSet<&'static str> {
        self.advertised_caps.iter().map(|c| c.name).collect()
    }

    /// Queue a disconnect to be performed outside the current handler.
    pub fn request_disconnect(&self, uid: &str, reason: &str) {
        let _ = self
            .disconnect_tx
            .try_send((uid.to_string(), reason.to_string()));
    }

    // ------------------------------------------------------------------
    // Fan-out (spec: SendToChannel / SendToChannels / SendToOperators)
    // ------------------------------------------------------------------

    /// Deliver to every member of a channel, optionally excluding one UID.
    pub async fn send_to_channel(&self, name: &str, msg: &Message, except: Option<&str>) {
        let Some(channel) = self.channels.get(name) else {
            return;
        };
        let members: Vec<Uid> = {
            let channel = channel.read().await;
            channel.members.keys().cloned().collect()
        };
        self.broker.send_to_many(members.iter(), msg, except);
    }

    /// Deliver to the union of several channels' members, once per user.
    pub async fn send_to_channels(&self, names: &[String], msg: &Message, except: Option<&str>) {
        let mut targets: HashSet<Uid> = HashSet::new();
        for name in names {
            if let Some(channel) = self.channels.get(name) {
                let channel = channel.read().await;
                targets.extend(channel.members.keys().cloned());
            }
        }
        self.broker.send_to_many(targets.iter(), msg, except);
    }

    /// Everyone sharing at least one channel with `uid`, excluding `uid`.
    pub async fn common_channel_uids(&self, uid: &str) -> Vec<Uid> {
        let channel_names: Vec<String> = match self.users.get(uid) {
            Some(user) => user.read().await.channels.keys().cloned().collect(),
            None => return Vec::new(),
        };
        let mut out: HashSet<Uid> = HashSet::new();
        for name in channel_names {
            if let Some(channel) = self.channels.get(&name) {
                let channel = channel.read().await;
                out.extend(channel.members.keys().cloned());
            }
        }
        out.remove(uid);
        out.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------

    /// The canonical teardown path, used by QUIT, KILL, timeouts, ban
    /// enforcement and S2S cascade quits.
    ///
    /// Removes the user from all channels (broadcasting QUIT once per
    /// observer), records WHOWAS, notifies monitors, clears the indexes,
    /// and floods the QUIT to the rest of the network for local users.
    pub async fn disconnect_user(self: &Arc<Self>, uid: &str, reason: &str) {
        let Some(user_arc) = self.users.get(uid) else {
            return;
        };

        let (nick, ident, host, visible_host, realname, channels, was_invisible, was_oper) = {
            let user = user_arc.read().await;
            (
                user.nick.clone(),
                user.ident.clone(),
                user.host.clone(),
                user.visible_host.clone(),
                user.realname.clone(),
                user.channels.keys().cloned().collect::<Vec<_>>(),
                user.modes.invisible,
                user.modes.oper,
            )
        };

        debug!(uid = %uid, nick = %nick, reason = %reason, "Disconnecting user");

        let quit_msg = Message::new("QUIT", vec![reason.to_string()])
            .with_prefix(Prefix::new(nick.clone(), ident.clone(), visible_host.clone()));

        // Observers across all channels, each notified once.
        self.send_to_channels(&channels, &quit_msg, Some(uid)).await;

        for name in &channels {
            if let Some(channel) = self.channels.get(name) {
                channel.write().await.remove_member(uid);
            }
            self.channels.remove_if_empty(name).await;
        }

        self.whowas.record(WhowasEntry {
            nick: nick.clone(),
            ident,
            host,
            realname,
            server: self.info.name.clone(),
            logout_at: chrono::Utc::now().timestamp(),
        });

        // MONITOR offline notifications.
        let offline = Message::numeric(
            &self.info.name,
            corvus_proto::Response::RPL_MONOFFLINE,
            vec!["*".to_string(), nick.clone()],
        );
        for watcher in self.monitors.watchers_of(&nick) {
            self.broker.send_to_uid(&watcher, &offline);
        }
        self.monitors.clear(uid);

        let is_local = self.users.is_local(uid);
        self.users.remove(uid, &nick);
        self.broker.unregister(uid);
        self.links.remove_uid(uid);

        if is_local {
            self.stats.user_disconnected(was_invisible, was_oper);
            // Flood the QUIT so remote servers prune the UID.
            let s2s_quit = Message::new("QUIT", vec![reason.to_string()])
                .with_prefix(Prefix::new(uid.to_string(), "", ""));
            self.links.broadcast(&s2s_quit, None).await;
        } else {
            self.stats.remote_user_removed(was_oper);
        }

        self.admin.user_event(UserEvent::Quit {
            uid: uid.to_string(),
            nick,
            reason: reason.to_string(),
        });
    }

    /// Notify monitor watchers that a nickname came online.
    pub fn notify_monitors_online(&self, nick: &str) {
        let online = Message::numeric(
            &self.info.name,
            corvus_proto::Response::RPL_MONONLINE,
            vec!["*".to_string(), nick.to_string()],
        );
        for watcher in self.monitors.watchers_of(nick) {
            self.broker.send_to_uid(&watcher, &online);
        }
    }
}
