//! OperServ - network operator service.

use async_trait::async_trait;
use corvus_proto::{ChannelExt, Message, Prefix};

use crate::security::{BanKind, ServerBan};
use crate::services::{Service, ServiceContext, ServiceResult, refuse, rest};

pub struct OperServ;

#[async_trait]
impl Service for OperServ {
    fn nickname(&self) -> &'static str {
        "OperServ"
    }

    fn realname(&self) -> &'static str {
        "Operator service"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["OS"]
    }

    fn uid_suffix(&self) -> char {
        'C'
    }

    fn operator_only(&self) -> bool {
        true
    }

    fn help(&self, command: Option<&str>) -> Vec<String> {
        match command.map(|c| c.to_ascii_uppercase()) {
            Some(cmd) if cmd == "AKILL" => vec![
                "AKILL ADD <mask> [duration] <reason>".to_string(),
                "AKILL DEL <mask>".to_string(),
                "AKILL LIST".to_string(),
                "Durations: 30m, 2h, 7d; omitted means permanent.".to_string(),
            ],
            _ => vec![
                "OperServ commands (operator only):".to_string(),
                "  AKILL {ADD|DEL|LIST}".to_string(),
                "  JUPE <server> <reason>".to_string(),
                "  STATS".to_string(),
                "  MODE <target> <modes> [args]".to_string(),
                "  KICK <#channel> <nick> [reason]".to_string(),
                "  KILL <nick> <reason>".to_string(),
                "  GLOBAL <text>".to_string(),
                "  RAW <line>".to_string(),
                "  RESTART | DIE".to_string(),
            ],
        }
    }

    async fn handle(
        &self,
        ctx: &ServiceContext<'_>,
        command: &str,
        args: &[&str],
    ) -> ServiceResult {
        match command {
            "AKILL" => akill(ctx, args).await,
            "JUPE" => jupe(ctx, args).await,
            "STATS" => stats(ctx).await,
            "MODE" => mode(ctx, args).await,
            "KICK" => kick(ctx, args).await,
            "KILL" => kill(ctx, args).await,
            "GLOBAL" => global(ctx, args).await,
            "RAW" => raw(ctx, args).await,
            "RESTART" => shutdown(ctx, "Restarting").await,
            "DIE" => shutdown(ctx, "Shutting down").await,
            _ => Err(refuse(format!(
                "Unknown command: \x02{}\x02. Use \x02HELP\x02 for a list of commands.",
                command
            ))),
        }
    }
}

/// Parse `30m` / `2h` / `7d` into seconds.
fn parse_duration(s: &str) -> Option<i64> {
    let (digits, unit) = s.split_at(s.len().saturating_sub(1));
    let n: i64 = digits.parse().ok()?;
    match unit {
        "m" => Some(n * 60),
        "h" => Some(n * 3600),
        "d" => Some(n * 86400),
        _ => None,
    }
}

async fn akill(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    match args.first().map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("ADD") => {
            let Some(mask) = args.get(1) else {
                return Err(refuse("Syntax: AKILL ADD <mask> [duration] <reason>"));
            };
            let (expires_at, reason_from) = match args.get(2).and_then(|s| parse_duration(s)) {
                Some(secs) => (Some(chrono::Utc::now().timestamp() + secs), 3),
                None => (None, 2),
            };
            let reason = {
                let r = rest(args, reason_from);
                if r.is_empty() { "No reason given".to_string() } else { r }
            };

            let ban = ServerBan {
                kind: BanKind::G,
                mask: mask.to_string(),
                reason: reason.clone(),
                set_by: ctx.source_nick.clone(),
                set_at: chrono::Utc::now().timestamp(),
                expires_at,
            };
            ctx.network.db.bans().add(&ban).await?;
            ctx.network.bans.add(ban);

            // Flood to the network and enforce locally.
            let akill_msg = Message::new(
                "AKILL",
                vec![
                    mask.to_string(),
                    expires_at.map(|e| e.to_string()).unwrap_or_else(|| "0".to_string()),
                    reason.clone(),
                ],
            )
            .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
            ctx.network.links.broadcast(&akill_msg, None).await;
            crate::handlers::bans::enforce_ban_on_users(ctx.network, &reason).await;

            ctx.reply(format!("AKILL on \x02{}\x02 added.", mask));
            Ok(())
        }
        Some("DEL") => {
            let Some(mask) = args.get(1) else {
                return Err(refuse("Syntax: AKILL DEL <mask>"));
            };
            let removed = ctx.network.bans.remove(BanKind::G, mask);
            ctx.network.db.bans().remove(BanKind::G, mask).await?;
            if !removed {
                return Err(refuse(format!("No AKILL on \x02{}\x02.", mask)));
            }
            let unakill_msg = Message::new("UNAKILL", vec![mask.to_string()])
                .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
            ctx.network.links.broadcast(&unakill_msg, None).await;
            ctx.reply(format!("AKILL on \x02{}\x02 removed.", mask));
            Ok(())
        }
        Some("LIST") => {
            let bans = ctx.network.bans.list(BanKind::G);
            if bans.is_empty() {
                ctx.reply("No AKILLs are set.");
                return Ok(());
            }
            for ban in bans {
                let expiry = ban
                    .expires_at
                    .and_then(|e| chrono::DateTime::from_timestamp(e, 0))
                    .map(|t| format!("expires {}", t.format("%Y-%m-%d %H:%M UTC")))
                    .unwrap_or_else(|| "permanent".to_string());
                ctx.reply(format!(
                    "  {} by {} ({}): {}",
                    ban.mask, ban.set_by, expiry, ban.reason
                ));
            }
            Ok(())
        }
        _ => Err(refuse("Syntax: AKILL {ADD|DEL|LIST}")),
    }
}

async fn jupe(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let Some(server) = args.first() else {
        return Err(refuse("Syntax: JUPE <server> <reason>"));
    };
    let reason = {
        let r = rest(args, 1);
        if r.is_empty() { "Juped".to_string() } else { r }
    };

    ctx.network.bans.add(ServerBan {
        kind: BanKind::Jupe,
        mask: server.to_string(),
        reason: reason.clone(),
        set_by: ctx.source_nick.clone(),
        set_at: chrono::Utc::now().timestamp(),
        expires_at: None,
    });

    // Delink it if it is currently on the network.
    if let Some(node) = ctx.network.links.server_by_name(server) {
        crate::s2s::handlers::perform_squit(ctx.network, &node.sid, &reason).await;
    }

    let jupe_msg = Message::new("JUPE", vec![server.to_string(), reason])
        .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
    ctx.network.links.broadcast(&jupe_msg, None).await;
    ctx.reply(format!("Server \x02{}\x02 juped.", server));
    Ok(())
}

async fn stats(ctx: &ServiceContext<'_>) -> ServiceResult {
    let snap = ctx.network.stats.snapshot();
    ctx.reply(format!(
        "Users: {} ({} local, {} invisible), opers: {}",
        snap.total_users(),
        snap.local_users,
        snap.invisible,
        snap.opers
    ));
    ctx.reply(format!(
        "Channels: {}, linked servers: {}, uptime: {}s",
        snap.channels, snap.servers, snap.uptime_secs
    ));
    ctx.reply(format!("Commands processed: {}", snap.commands_processed));
    Ok(())
}

/// Operator override MODE, applied without channel-privilege checks.
async fn mode(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let Some(target) = args.first() else {
        return Err(refuse("Syntax: MODE <target> <modes> [args]"));
    };
    if !target.is_channel_name() {
        return Err(refuse("Only channel modes can be set through OperServ."));
    }
    let Some(modestr) = args.get(1) else {
        return Err(refuse("Syntax: MODE <target> <modes> [args]"));
    };
    crate::handlers::mode::apply_channel_mode_override(
        ctx.network,
        target,
        modestr,
        &args[2..],
        &Prefix::new("OperServ", "services", ctx.network.info.name.clone()),
    )
    .await
    .map_err(|e| refuse(e))?;
    Ok(())
}

async fn kick(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let Some(name) = args.first().filter(|n| n.is_channel_name()) else {
        return Err(refuse("Syntax: KICK <#channel> <nick> [reason]"));
    };
    let Some(nick) = args.get(1) else {
        return Err(refuse("Syntax: KICK <#channel> <nick> [reason]"));
    };
    let reason = {
        let r = rest(args, 2);
        if r.is_empty() { ctx.source_nick.clone() } else { r }
    };

    let Some(target_uid) = ctx.network.users.uid_of_nick(nick) else {
        return Err(refuse(format!("\x02{}\x02 is not online.", nick)));
    };
    let Some(channel) = ctx.network.channels.get(name) else {
        return Err(refuse(format!("Channel \x02{}\x02 does not exist.", name)));
    };

    let kick_msg = Message::new("KICK", vec![name.to_string(), nick.to_string(), reason])
        .with_prefix(Prefix::new("OperServ", "services", ctx.network.info.name.clone()));
    ctx.network.send_to_channel(name, &kick_msg, None).await;
    channel.write().await.remove_member(&target_uid);
    if let Some(user) = ctx.network.users.get(&target_uid) {
        user.write()
            .await
            .part_channel(&corvus_proto::irc_to_lower(name));
    }
    ctx.network.channels.remove_if_empty(name).await;
    Ok(())
}

async fn kill(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let Some(nick) = args.first() else {
        return Err(refuse("Syntax: KILL <nick> <reason>"));
    };
    let reason = {
        let r = rest(args, 1);
        if r.is_empty() { "Killed".to_string() } else { r }
    };
    let Some(target_uid) = ctx.network.users.uid_of_nick(nick) else {
        return Err(refuse(format!("\x02{}\x02 is not online.", nick)));
    };

    // Services are protected.
    if ctx.network.services.by_target(nick).is_some() {
        return Err(refuse("You may not kill a network service."));
    }

    ctx.network
        .request_disconnect(&target_uid, &format!("Killed ({})", reason));
    ctx.reply(format!("\x02{}\x02 has been killed.", nick));
    Ok(())
}

async fn global(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let text = rest(args, 0);
    if text.is_empty() {
        return Err(refuse("Syntax: GLOBAL <text>"));
    }
    let notice = Message::notice("$*", format!("[Network notice] {}", text)).with_prefix(
        Prefix::new("OperServ", "services", ctx.network.info.name.clone()),
    );
    ctx.network.broker.send_to_all(&notice, None);
    ctx.network.links.broadcast(&notice, None).await;
    Ok(())
}

/// Inject a raw line onto the S2S mesh. Sharp tool, operator only.
async fn raw(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let line = rest(args, 0);
    let msg: Message = line
        .parse()
        .map_err(|e| refuse(format!("Unparseable line: {}", e)))?;
    ctx.network.links.broadcast(&msg, None).await;
    ctx.reply("Line sent.");
    Ok(())
}

async fn shutdown(ctx: &ServiceContext<'_>, what: &str) -> ServiceResult {
    ctx.reply(format!("{} by request of {}.", what, ctx.source_nick));
    ctx.network.admin.notify(
        crate::admin::NotificationLevel::Warning,
        format!("{} by {}", what, ctx.source_nick),
    );
    let _ = ctx.network.shutdown.send(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_duration;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("30m"), Some(1800));
        assert_eq!(parse_duration("2h"), Some(7200));
        assert_eq!(parse_duration("1d"), Some(86400));
        assert_eq!(parse_duration("nope"), None);
        assert_eq!(parse_duration("10x"), None);
    }
}
