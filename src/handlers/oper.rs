//! Operator handlers: OPER, KILL, WALLOPS, REHASH, DIE, RESTART,
//! CONNECT, SQUIT.

use async_trait::async_trait;
use corvus_proto::{Message, Prefix, Response, matches_hostmask};
use tracing::{info, warn};

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec, server_notice, user_prefix};
use crate::security::password::verify_password_sync;
use crate::state::network::HotConfig;

static OPER_SPEC: HandlerSpec = HandlerSpec::new("OPER", 2);

/// Handler for OPER.
pub struct OperHandler;

#[async_trait]
impl Handler for OperHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &OPER_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let name = msg.arg_or_empty(0).to_string();
        let password = msg.arg_or_empty(1).to_string();

        let hostmask = match ctx.network.users.get(ctx.uid) {
            Some(user) => {
                let user = user.read().await;
                format!("{}@{}", user.ident, user.host)
            }
            None => return Ok(()),
        };

        let block = {
            let hot = ctx.network.hot_config.read();
            hot.oper_blocks
                .iter()
                .find(|b| b.name == name)
                .cloned()
        };
        let Some(block) = block else {
            return ctx
                .numeric(
                    Response::ERR_NOOPERHOST,
                    vec!["No O-lines for your host".to_string()],
                )
                .await;
        };

        let host_ok = block.hostmasks.is_empty()
            || block.hostmasks.iter().any(|m| matches_hostmask(m, &hostmask));
        if !host_ok {
            return ctx
                .numeric(
                    Response::ERR_NOOPERHOST,
                    vec!["No O-lines for your host".to_string()],
                )
                .await;
        }

        if !verify_password_sync(&password, &block.password_hash) {
            warn!(uid = %ctx.uid, oper = %name, "Failed OPER attempt");
            return ctx
                .numeric(
                    Response::ERR_PASSWDMISMATCH,
                    vec!["Password incorrect".to_string()],
                )
                .await;
        }

        if let Some(user) = ctx.network.users.get(ctx.uid) {
            let mut user = user.write().await;
            user.modes.oper = true;
            user.oper_class = Some(block.class.clone());
        }
        ctx.handshake.is_oper = true;
        ctx.network.broker.set_oper(ctx.uid, true);
        ctx.network.stats.opered();

        info!(uid = %ctx.uid, oper = %name, class = %block.class, "Operator authenticated");
        ctx.numeric(
            Response::RPL_YOUREOPER,
            vec!["You are now an IRC operator".to_string()],
        )
        .await?;

        // Tell the user their new mode.
        let nick = ctx.nick().to_string();
        ctx.send(
            Message::new("MODE", vec![nick.clone(), "+o".to_string()])
                .with_prefix(Prefix::new(nick, String::new(), String::new())),
        )
        .await
    }
}

static KILL_SPEC: HandlerSpec = HandlerSpec::new("KILL", 2).oper_only();

/// Handler for KILL.
pub struct KillHandler;

#[async_trait]
impl Handler for KillHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &KILL_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg_or_empty(0).to_string();
        let reason = msg.arg_or_empty(1).to_string();

        // Server names are not killable.
        if target.contains('.') {
            return ctx
                .numeric(
                    Response::ERR_CANTKILLSERVER,
                    vec!["You can't kill a server!".to_string()],
                )
                .await;
        }
        if ctx.network.services.by_target(&target).is_some() {
            return ctx
                .numeric(
                    Response::ERR_NOPRIVILEGES,
                    vec!["You may not kill a network service".to_string()],
                )
                .await;
        }
        let Some(target_uid) = ctx.network.users.uid_of_nick(&target) else {
            return ctx
                .send(super::err_nosuchnick(ctx.server_name(), ctx.nick(), &target))
                .await;
        };

        let full_reason = format!("Killed ({} ({}))", ctx.nick(), reason);
        info!(oper = %ctx.nick(), target = %target, reason = %reason, "KILL");

        // Forward across the network, then take it down locally.
        let s2s_kill = Message::new("KILL", vec![target_uid.clone(), full_reason.clone()])
            .with_prefix(Prefix::new(ctx.uid.to_string(), "", ""));
        ctx.network.links.broadcast(&s2s_kill, None).await;

        ctx.network.request_disconnect(&target_uid, &full_reason);
        Ok(())
    }
}

static WALLOPS_SPEC: HandlerSpec = HandlerSpec::new("WALLOPS", 1).oper_only();

/// Handler for WALLOPS: delivered to operators and +w users.
pub struct WallopsHandler;

#[async_trait]
impl Handler for WallopsHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &WALLOPS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let text = msg.arg_or_empty(0).to_string();
        let prefix = match user_prefix(ctx.network, ctx.uid).await {
            Some(prefix) => prefix,
            None => return Ok(()),
        };
        let wallops = Message::new("WALLOPS", vec![text.clone()]).with_prefix(prefix);

        // +w users opt in; operators always hear it.
        for uid in ctx.network.users.all_uids() {
            let Some(user) = ctx.network.users.get(&uid) else {
                continue;
            };
            let wants = {
                let user = user.read().await;
                user.modes.wallops || user.modes.oper
            };
            if wants {
                ctx.network.broker.send_to_uid(&uid, &wallops);
            }
        }

        let s2s = Message::new("WALLOPS", vec![text])
            .with_prefix(Prefix::new(ctx.uid.to_string(), "", ""));
        ctx.network.links.broadcast(&s2s, None).await;
        Ok(())
    }
}

static REHASH_SPEC: HandlerSpec = HandlerSpec::new("REHASH", 0).oper_only();

/// Handler for REHASH: reloads the hot-swappable configuration subset.
pub struct RehashHandler;

#[async_trait]
impl Handler for RehashHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &REHASH_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        let config_path = ctx.network.config_path.clone();
        ctx.numeric(
            Response::RPL_REHASHING,
            vec![config_path.clone(), "Rehashing".to_string()],
        )
        .await?;

        match crate::config::Config::load(&config_path) {
            Ok(config) => match crate::config::validate(&config) {
                Ok(()) => {
                    *ctx.network.hot_config.write() = HotConfig::from_config(&config);
                    info!(oper = %ctx.nick(), "Configuration rehashed");
                    ctx.send(server_notice(
                        ctx.server_name(),
                        ctx.nick(),
                        "Rehash complete",
                    ))
                    .await
                }
                Err(errors) => {
                    ctx.send(server_notice(
                        ctx.server_name(),
                        ctx.nick(),
                        format!("Rehash failed: {} validation error(s)", errors.len()),
                    ))
                    .await
                }
            },
            Err(e) => {
                ctx.send(server_notice(
                    ctx.server_name(),
                    ctx.nick(),
                    format!("Rehash failed: {}", e),
                ))
                .await
            }
        }
    }
}

static DIE_SPEC: HandlerSpec = HandlerSpec::new("DIE", 0).oper_only();

/// Handler for DIE.
pub struct DieHandler;

#[async_trait]
impl Handler for DieHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &DIE_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        warn!(oper = %ctx.nick(), "Server shutdown requested via DIE");
        ctx.network.admin.notify(
            crate::admin::NotificationLevel::Warning,
            format!("DIE by {}", ctx.nick()),
        );
        let _ = ctx.network.shutdown.send(());
        Ok(())
    }
}

static RESTART_SPEC: HandlerSpec = HandlerSpec::new("RESTART", 0).oper_only();

/// Handler for RESTART. The process supervisor does the actual restart;
/// we just shut down cleanly.
pub struct RestartHandler;

#[async_trait]
impl Handler for RestartHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &RESTART_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        warn!(oper = %ctx.nick(), "Server restart requested");
        ctx.network.admin.notify(
            crate::admin::NotificationLevel::Warning,
            format!("RESTART by {}", ctx.nick()),
        );
        let _ = ctx.network.shutdown.send(());
        Ok(())
    }
}

static CONNECT_SPEC: HandlerSpec = HandlerSpec::new("CONNECT", 1).oper_only();

/// Handler for CONNECT: initiate an outbound server link.
pub struct ConnectHandler;

#[async_trait]
impl Handler for ConnectHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &CONNECT_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg_or_empty(0).to_string();

        let Some(block) = ctx
            .network
            .links
            .link_blocks
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(&target))
            .cloned()
        else {
            return ctx
                .numeric(
                    Response::ERR_NOSUCHSERVER,
                    vec![target, "No such server configured".to_string()],
                )
                .await;
        };

        if ctx.network.links.is_linked(&block.name) {
            return ctx
                .send(server_notice(
                    ctx.server_name(),
                    ctx.nick(),
                    format!("{} is already linked", block.name),
                ))
                .await;
        }

        info!(oper = %ctx.nick(), server = %block.name, "CONNECT");
        crate::s2s::link::connect_to_peer(ctx.network.clone(), block.clone());
        ctx.send(server_notice(
            ctx.server_name(),
            ctx.nick(),
            format!("Connecting to {}", block.name),
        ))
        .await
    }
}

static SQUIT_SPEC: HandlerSpec = HandlerSpec::new("SQUIT", 1).oper_only();

/// Handler for SQUIT: delink a server.
pub struct SquitHandler;

#[async_trait]
impl Handler for SquitHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &SQUIT_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg_or_empty(0).to_string();
        let reason = msg
            .arg(1)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("SQUIT by {}", ctx.nick()));

        let Some(node) = ctx.network.links.server_by_name(&target) else {
            return ctx
                .numeric(
                    Response::ERR_NOSUCHSERVER,
                    vec![target, "No such server".to_string()],
                )
                .await;
        };

        info!(oper = %ctx.nick(), server = %target, reason = %reason, "SQUIT");
        crate::s2s::handlers::perform_squit(ctx.network, &node.sid, &reason).await;
        let squit = Message::new("SQUIT", vec![node.sid, reason])
            .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
        ctx.network.links.broadcast(&squit, None).await;
        Ok(())
    }
}
