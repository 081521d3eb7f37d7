//! In-process IRC services (NickServ, ChanServ, OperServ, MemoServ,
//! HostServ, BotServ).
//!
//! Services are pseudo-users with fixed UIDs (`<SID>AAAAAx`) introduced
//! over S2S with mode `+S`. A PRIVMSG whose target is a service nick,
//! alias, or UID is decoded into `{command, args}` and dispatched to the
//! service's command table. Handler errors are caught and reported as a
//! generic notice; they never unwind the dispatcher.

pub mod botserv;
pub mod chanserv;
pub mod hostserv;
pub mod memoserv;
pub mod nickserv;
pub mod operserv;

use std::sync::Arc;

use async_trait::async_trait;
use corvus_proto::{Message, Prefix, irc_to_lower};
use tracing::warn;

use crate::state::{Network, UidGenerator};

/// Result type for service command handlers.
pub type ServiceResult = Result<(), ServiceError>;

/// Errors a service command can produce.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// User-visible refusal; the text is sent as a notice verbatim.
    #[error("{0}")]
    Refused(String),
    #[error("repository error: {0}")]
    Repository(#[from] crate::db::DbError),
}

/// Convenience constructor for refusals.
pub fn refuse(text: impl Into<String>) -> ServiceError {
    ServiceError::Refused(text.into())
}

/// Context handed to a service command.
pub struct ServiceContext<'a> {
    pub network: &'a Arc<Network>,
    pub source_uid: &'a str,
    pub source_nick: String,
    /// Account the source is identified to, if any.
    pub source_account: Option<String>,
    /// Set by a prior successful OPER; grants override on most services.
    pub is_operator: bool,
    service_nick: &'a str,
}

impl ServiceContext<'_> {
    /// Send a NOTICE from the service back to the source, routed over
    /// S2S when the source is remote.
    pub fn reply(&self, text: impl Into<String>) {
        let msg = Message::notice(self.source_nick.clone(), text.into()).with_prefix(Prefix::new(
            self.service_nick,
            "services",
            self.network.info.name.clone(),
        ));
        if self.network.users.is_local(self.source_uid) {
            self.network.broker.send_to_uid(self.source_uid, &msg);
        } else {
            let network = Arc::clone(self.network);
            let uid = self.source_uid.to_string();
            let mut remote = msg;
            remote.params[0] = uid.clone();
            tokio::spawn(async move {
                network.links.send_to_uid_owner(&uid, remote).await;
            });
        }
    }

    /// The source's account id, or a refusal asking them to identify.
    pub async fn require_account_id(&self) -> Result<i64, ServiceError> {
        let Some(account) = &self.source_account else {
            return Err(refuse("You must identify to services first."));
        };
        let found = self.network.db.accounts().find_by_name(account).await?;
        found
            .map(|a| a.id)
            .ok_or_else(|| refuse("Your account no longer exists."))
    }
}

/// A network service.
#[async_trait]
pub trait Service: Send + Sync {
    fn nickname(&self) -> &'static str;

    fn ident(&self) -> &'static str {
        "services"
    }

    fn realname(&self) -> &'static str;

    /// Short aliases, e.g. `NS` for NickServ.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// The unique character in this service's fixed UID.
    fn uid_suffix(&self) -> char;

    /// Whether only operators may talk to this service at all.
    fn operator_only(&self) -> bool {
        false
    }

    /// Help text; `command` narrows to one entry.
    fn help(&self, command: Option<&str>) -> Vec<String>;

    /// Execute one command. `command` is uppercased; `args` is the
    /// remainder, space-split.
    async fn handle(&self, ctx: &ServiceContext<'_>, command: &str, args: &[&str])
        -> ServiceResult;
}

/// Owns the service singletons and routes messages to them.
pub struct ServiceManager {
    sid: String,
    services: Vec<Arc<dyn Service>>,
}

impl ServiceManager {
    pub fn new(sid: &str) -> Self {
        Self {
            sid: sid.to_string(),
            services: vec![
                Arc::new(nickserv::NickServ),
                Arc::new(chanserv::ChanServ),
                Arc::new(operserv::OperServ),
                Arc::new(memoserv::MemoServ),
                Arc::new(hostserv::HostServ),
                Arc::new(botserv::BotServ),
            ],
        }
    }

    pub fn all(&self) -> &[Arc<dyn Service>] {
        &self.services
    }

    /// The fixed UID of a service on this server.
    pub fn uid_of(&self, service: &dyn Service) -> String {
        UidGenerator::service_uid(&self.sid, service.uid_suffix())
    }

    /// Resolve a PRIVMSG target to a service by nick, alias, or UID.
    pub fn by_target(&self, target: &str) -> Option<Arc<dyn Service>> {
        let target_lower = irc_to_lower(target);
        self.services
            .iter()
            .find(|s| {
                irc_to_lower(s.nickname()) == target_lower
                    || s.aliases().iter().any(|a| irc_to_lower(a) == target_lower)
                    || self.uid_of(s.as_ref()) == target
            })
            .cloned()
    }
}

/// Route a PRIVMSG to a service. Returns true when the target was a
/// service (whether or not the command succeeded).
pub async fn dispatch(network: &Arc<Network>, source_uid: &str, target: &str, text: &str) -> bool {
    let Some(service) = network.services.by_target(target) else {
        return false;
    };

    let (source_nick, source_account, is_operator) = match network.users.get(source_uid) {
        Some(user) => {
            let user = user.read().await;
            (user.nick.clone(), user.account.clone(), user.modes.oper)
        }
        None => return true,
    };

    let ctx = ServiceContext {
        network,
        source_uid,
        source_nick,
        source_account,
        is_operator,
        service_nick: service.nickname(),
    };

    let mut tokens = text.split_ascii_whitespace();
    let Some(command) = tokens.next() else {
        ctx.reply(format!(
            "No command given. Use \x02/msg {} HELP\x02 for a list of commands.",
            service.nickname()
        ));
        return true;
    };
    let command = command.to_ascii_uppercase();
    let args: Vec<&str> = tokens.collect();

    if service.operator_only() && !ctx.is_operator {
        ctx.reply("Access denied.");
        return true;
    }

    if command == "HELP" {
        for line in service.help(args.first().copied()) {
            ctx.reply(line);
        }
        return true;
    }

    match service.handle(&ctx, &command, &args).await {
        Ok(()) => {}
        Err(ServiceError::Refused(text)) => ctx.reply(text),
        Err(ServiceError::Repository(e)) => {
            warn!(service = service.nickname(), error = %e, "Service repository error");
            ctx.reply("A temporary error occurred, please try again later.");
        }
    }
    true
}

/// Re-join `args[from..]` into the original free-text remainder.
///
/// Service arguments are space-split; commands with a trailing free-text
/// parameter (memo bodies, topics, reasons) re-join it.
pub fn rest(args: &[&str], from: usize) -> String {
    args[from.min(args.len())..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_resolution() {
        let mgr = ServiceManager::new("001");
        assert!(mgr.by_target("NickServ").is_some());
        assert!(mgr.by_target("nickserv").is_some());
        assert!(mgr.by_target("NS").is_some());
        assert!(mgr.by_target("001AAAAAA").is_some());
        assert!(mgr.by_target("randomnick").is_none());
    }

    #[test]
    fn uids_are_unique_and_fixed() {
        let mgr = ServiceManager::new("001");
        let mut uids: Vec<String> = mgr.all().iter().map(|s| mgr.uid_of(s.as_ref())).collect();
        uids.sort();
        uids.dedup();
        assert_eq!(uids.len(), mgr.all().len());
        assert!(uids.iter().all(|u| u.starts_with("001AAAAA")));
    }

    #[test]
    fn rest_joins_remainder() {
        let args = vec!["bob", "Hello", "there"];
        assert_eq!(rest(&args, 1), "Hello there");
        assert_eq!(rest(&args, 5), "");
    }
}
