//! IRC command handlers.
//!
//! The [`Registry`] owns one boxed handler per command. Each handler
//! declares its gating in a [`HandlerSpec`]; the registry enforces the
//! gates in order (unknown command, registration, operator, parameter
//! count) before invoking the handler, so handler bodies only see
//! messages that already passed them.

pub mod account;
pub mod admin;
pub mod bans;
pub mod cap;
pub mod channel;
pub mod chathistory;
pub mod connection;
pub mod extensions;
pub mod helpers;
pub mod messaging;
pub mod mode;
pub mod monitor;
pub mod oper;
pub mod sasl;
pub mod server_query;
pub mod user_query;
pub mod user_status;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use corvus_proto::Message;
use tokio::sync::mpsc;

use crate::error::{HandlerError, HandlerResult};
use crate::state::{Handshake, Network};

pub use extensions::Extensions;
pub use helpers::*;

/// Static description of a command's dispatch requirements.
pub struct HandlerSpec {
    pub name: &'static str,
    pub min_params: usize,
    pub requires_registration: bool,
    pub requires_oper: bool,
}

impl HandlerSpec {
    pub const fn new(name: &'static str, min_params: usize) -> Self {
        Self {
            name,
            min_params,
            requires_registration: true,
            requires_oper: false,
        }
    }

    pub const fn pre_registration(mut self) -> Self {
        self.requires_registration = false;
        self
    }

    pub const fn oper_only(mut self) -> Self {
        self.requires_oper = true;
        self
    }
}

/// Handler context passed to each command handler.
pub struct Context<'a> {
    /// The connection's UID (allocated at accept, before registration).
    pub uid: &'a str,
    /// Shared server state.
    pub network: &'a Arc<Network>,
    /// Outbound queue of this connection.
    pub sender: &'a mpsc::Sender<Message>,
    /// Registration state of this connection.
    pub handshake: &'a mut Handshake,
}

impl Context<'_> {
    /// The nick for numeric replies (`*` before NICK).
    pub fn nick(&self) -> &str {
        self.handshake.nick_or_star()
    }

    pub fn server_name(&self) -> &str {
        &self.network.info.name
    }

    /// Queue a message for this connection.
    pub async fn send(&self, msg: Message) -> Result<(), HandlerError> {
        self.sender.send(msg).await?;
        Ok(())
    }

    /// Queue a numeric reply; the nick parameter is prepended.
    pub async fn numeric(
        &self,
        response: corvus_proto::Response,
        params: Vec<String>,
    ) -> Result<(), HandlerError> {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(self.nick().to_string());
        full.extend(params);
        self.send(Message::numeric(self.server_name(), response, full))
            .await
    }
}

/// Trait implemented by all command handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// This handler's dispatch requirements.
    fn spec(&self) -> &'static HandlerSpec;

    /// Handle an incoming message that passed the registry gates.
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult;
}

/// Registry of command handlers.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    /// Create a registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        let mut add = |h: Box<dyn Handler>| {
            handlers.insert(h.spec().name, h);
        };

        // Registration
        add(Box::new(connection::NickHandler));
        add(Box::new(connection::UserHandler));
        add(Box::new(connection::PassHandler));
        add(Box::new(connection::QuitHandler));
        add(Box::new(connection::PingHandler));
        add(Box::new(connection::PongHandler));
        add(Box::new(connection::WebircHandler));
        add(Box::new(cap::CapHandler));
        add(Box::new(sasl::AuthenticateHandler));

        // Messaging
        add(Box::new(messaging::PrivmsgHandler));
        add(Box::new(messaging::NoticeHandler));
        add(Box::new(messaging::TagmsgHandler));

        // Channel
        add(Box::new(channel::JoinHandler));
        add(Box::new(channel::PartHandler));
        add(Box::new(channel::KickHandler));
        add(Box::new(channel::TopicHandler));
        add(Box::new(channel::InviteHandler));
        add(Box::new(channel::NamesHandler));
        add(Box::new(channel::ListHandler));
        add(Box::new(mode::ModeHandler));

        // Query
        add(Box::new(user_query::WhoHandler));
        add(Box::new(user_query::WhoisHandler));
        add(Box::new(user_query::WhowasHandler));
        add(Box::new(user_query::UserhostHandler));
        add(Box::new(user_query::IsonHandler));
        add(Box::new(monitor::MonitorHandler));
        add(Box::new(chathistory::ChathistoryHandler));

        // Bans
        add(Box::new(bans::KlineHandler));
        add(Box::new(bans::UnklineHandler));
        add(Box::new(bans::GlineHandler));
        add(Box::new(bans::UnglineHandler));
        add(Box::new(bans::ZlineHandler));
        add(Box::new(bans::UnzlineHandler));

        // Operator and server control
        add(Box::new(oper::OperHandler));
        add(Box::new(oper::KillHandler));
        add(Box::new(oper::WallopsHandler));
        add(Box::new(oper::RehashHandler));
        add(Box::new(oper::DieHandler));
        add(Box::new(oper::RestartHandler));
        add(Box::new(oper::ConnectHandler));
        add(Box::new(oper::SquitHandler));
        add(Box::new(server_query::StatsHandler));
        add(Box::new(server_query::LinksHandler));
        add(Box::new(server_query::TraceHandler));
        add(Box::new(server_query::MotdHandler));
        add(Box::new(server_query::LusersHandler));
        add(Box::new(server_query::VersionHandler));
        add(Box::new(server_query::TimeHandler));
        add(Box::new(server_query::AdminHandler));
        add(Box::new(server_query::InfoHandler));
        add(Box::new(server_query::HelpHandler));

        // Admin SA*
        add(Box::new(admin::SajoinHandler));
        add(Box::new(admin::SapartHandler));
        add(Box::new(admin::SanickHandler));
        add(Box::new(admin::SamodeHandler));

        // Extensions
        add(Box::new(user_status::AwayHandler));
        add(Box::new(user_status::SetnameHandler));
        add(Box::new(user_status::AcceptHandler));
        add(Box::new(extensions::LoadmodHandler));
        add(Box::new(extensions::ScriptsHandler));
        add(Box::new(extensions::TriggersHandler));
        add(Box::new(extensions::PluginsHandler));

        Self { handlers }
    }

    /// Whether a command exists (used by S2S to tell client verbs apart).
    pub fn knows(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Dispatch a message, applying the gates in spec order.
    pub async fn dispatch(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Some(handler) = self.handlers.get(msg.command.as_str()) else {
            // Numerics and unknown verbs from clients both land here.
            return Err(HandlerError::UnknownCommand(msg.command.clone()));
        };
        let spec = handler.spec();

        if spec.requires_registration && !ctx.handshake.is_registered() {
            return Err(HandlerError::NotRegistered);
        }
        if spec.requires_oper && !ctx.handshake.is_oper {
            return Err(HandlerError::NoPrivileges);
        }
        if msg.params.len() < spec.min_params {
            return Err(HandlerError::NeedMoreParams);
        }

        ctx.network.stats.command_processed();
        handler.handle(ctx, msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builder() {
        let spec = HandlerSpec::new("JOIN", 1);
        assert!(spec.requires_registration);
        assert!(!spec.requires_oper);

        let spec = HandlerSpec::new("NICK", 1).pre_registration();
        assert!(!spec.requires_registration);

        let spec = HandlerSpec::new("KILL", 2).oper_only();
        assert!(spec.requires_oper);
    }

    #[test]
    fn registry_covers_core_commands() {
        let registry = Registry::new();
        for cmd in [
            "NICK", "USER", "PASS", "QUIT", "PING", "PONG", "CAP", "AUTHENTICATE", "WEBIRC",
            "PRIVMSG", "NOTICE", "TAGMSG", "JOIN", "PART", "KICK", "TOPIC", "INVITE", "MODE",
            "NAMES", "LIST", "WHO", "WHOIS", "WHOWAS", "USERHOST", "ISON", "MONITOR",
            "CHATHISTORY", "KLINE", "UNKLINE", "GLINE", "ZLINE", "OPER", "KILL", "WALLOPS",
            "STATS", "REHASH", "DIE", "RESTART", "CONNECT", "LINKS", "TRACE", "SQUIT", "SAJOIN",
            "SAPART", "SANICK", "SAMODE", "SETNAME", "ACCEPT", "AWAY", "MOTD", "LUSERS",
            "VERSION", "TIME", "ADMIN", "INFO", "HELP", "LOADMOD", "SCRIPTS", "TRIGGERS",
            "PLUGINS",
        ] {
            assert!(registry.handlers.contains_key(cmd), "missing handler {cmd}");
        }
    }
}
