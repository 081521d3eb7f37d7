//! Server-ban handlers: KLINE, GLINE, ZLINE and their removals.

use std::sync::Arc;

use async_trait::async_trait;
use corvus_proto::{Message, Prefix};

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec, server_notice};
use crate::security::{BanKind, ServerBan};
use crate::state::Network;

/// Parse `KLINE [minutes] <mask> [reason]` style arguments.
fn parse_ban_args(msg: &Message) -> (Option<i64>, String, String) {
    let mut idx = 0;
    let duration_mins: Option<i64> = msg.arg(0).and_then(|a| a.parse().ok());
    if duration_mins.is_some() {
        idx = 1;
    }
    let mask = msg.arg_or_empty(idx).to_string();
    let reason = msg
        .params
        .get(idx + 1..)
        .map(|rest| rest.join(" "))
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "No reason given".to_string());
    (duration_mins, mask, reason)
}

/// Install a ban: cache, repository, enforcement, and (for G-lines) the
/// network flood.
async fn add_ban(ctx: &Context<'_>, kind: BanKind, msg: &Message) -> HandlerResult {
    let (duration_mins, mask, reason) = parse_ban_args(msg);
    if mask.is_empty() {
        return Err(crate::error::HandlerError::NeedMoreParams);
    }

    let now = chrono::Utc::now().timestamp();
    let ban = ServerBan {
        kind,
        mask: mask.clone(),
        reason: reason.clone(),
        set_by: ctx.nick().to_string(),
        set_at: now,
        expires_at: duration_mins.map(|m| now + m * 60),
    };

    if let Err(e) = ctx.network.db.bans().add(&ban).await {
        tracing::warn!(error = %e, "Failed to persist ban");
    }
    ctx.network.bans.add(ban.clone());

    tracing::info!(oper = %ctx.nick(), kind = kind.as_str(), mask = %mask, "Ban added");
    ctx.send(server_notice(
        ctx.server_name(),
        ctx.nick(),
        format!("Added {} for {} ({})", kind.as_str(), mask, reason),
    ))
    .await?;

    if kind == BanKind::G {
        let akill = Message::new(
            "AKILL",
            vec![
                mask,
                ban.expires_at
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "0".to_string()),
                reason.clone(),
            ],
        )
        .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
        ctx.network.links.broadcast(&akill, None).await;
    }

    enforce_ban_on_users(ctx.network, &reason).await;
    Ok(())
}

async fn remove_ban(ctx: &Context<'_>, kind: BanKind, msg: &Message) -> HandlerResult {
    let mask = msg.arg_or_empty(0).to_string();
    let removed = ctx.network.bans.remove(kind, &mask);
    if let Err(e) = ctx.network.db.bans().remove(kind, &mask).await {
        tracing::warn!(error = %e, "Failed to remove persisted ban");
    }

    let text = if removed {
        format!("Removed {} for {}", kind.as_str(), mask)
    } else {
        format!("No {} for {}", kind.as_str(), mask)
    };
    ctx.send(server_notice(ctx.server_name(), ctx.nick(), text)).await?;

    if removed && kind == BanKind::G {
        let unakill = Message::new("UNAKILL", vec![mask])
            .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
        ctx.network.links.broadcast(&unakill, None).await;
    }
    Ok(())
}

/// Sweep connected local users against the active ban set and drop
/// matches. Used after any ban installation, local or flooded.
pub async fn enforce_ban_on_users(network: &Arc<Network>, _reason: &str) {
    for uid in network.users.local_uids() {
        let Some(user) = network.users.get(&uid) else {
            continue;
        };
        let (usermask, ip, is_service) = {
            let user = user.read().await;
            (user.real_usermask(), user.ip.clone(), user.modes.service)
        };
        if is_service {
            continue;
        }
        if let Some(ban) = network.bans.check_user(&usermask, &ip) {
            network.request_disconnect(
                &uid,
                &format!("{} ({})", ban.kind.as_str(), ban.reason),
            );
        }
    }
}

macro_rules! ban_handler {
    ($name:ident, $spec:ident, $cmd:literal, $min:literal, $kind:expr, $adding:literal) => {
        static $spec: HandlerSpec = HandlerSpec::new($cmd, $min).oper_only();

        pub struct $name;

        #[async_trait]
        impl Handler for $name {
            fn spec(&self) -> &'static HandlerSpec {
                &$spec
            }

            async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
                if $adding {
                    add_ban(ctx, $kind, msg).await
                } else {
                    remove_ban(ctx, $kind, msg).await
                }
            }
        }
    };
}

ban_handler!(KlineHandler, KLINE_SPEC, "KLINE", 1, BanKind::K, true);
ban_handler!(UnklineHandler, UNKLINE_SPEC, "UNKLINE", 1, BanKind::K, false);
ban_handler!(GlineHandler, GLINE_SPEC, "GLINE", 1, BanKind::G, true);
ban_handler!(UnglineHandler, UNGLINE_SPEC, "UNGLINE", 1, BanKind::G, false);
ban_handler!(ZlineHandler, ZLINE_SPEC, "ZLINE", 1, BanKind::Z, true);
ban_handler!(UnzlineHandler, UNZLINE_SPEC, "UNZLINE", 1, BanKind::Z, false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_args_with_duration() {
        let msg = Message::new(
            "KLINE",
            vec!["30".into(), "*@spam.example".into(), "go away".into()],
        );
        let (duration, mask, reason) = parse_ban_args(&msg);
        assert_eq!(duration, Some(30));
        assert_eq!(mask, "*@spam.example");
        assert_eq!(reason, "go away");
    }

    #[test]
    fn ban_args_without_duration() {
        let msg = Message::new("KLINE", vec!["*@spam.example".into()]);
        let (duration, mask, reason) = parse_ban_args(&msg);
        assert_eq!(duration, None);
        assert_eq!(mask, "*@spam.example");
        assert_eq!(reason, "No reason given");
    }
}
