//! Messaging handlers: PRIVMSG, NOTICE, TAGMSG.

use async_trait::async_trait;
use corvus_proto::colors::{has_formatting, is_action, is_ctcp, strip_formatting};
use corvus_proto::{ChannelExt, Message, Prefix, Response, Tag, irc_to_lower};

use crate::db::StoredMessage;
use crate::error::HandlerResult;
use crate::handlers::{
    Context, Handler, HandlerSpec, err_nosuchchannel, err_nosuchnick, time_tag_now, user_prefix,
};
use crate::services;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Privmsg,
    Notice,
    Tagmsg,
}

impl Kind {
    fn verb(&self) -> &'static str {
        match self {
            Kind::Privmsg => "PRIVMSG",
            Kind::Notice => "NOTICE",
            Kind::Tagmsg => "TAGMSG",
        }
    }

    /// NOTICE never generates error replies.
    fn silent(&self) -> bool {
        matches!(self, Kind::Notice)
    }
}

static PRIVMSG_SPEC: HandlerSpec = HandlerSpec::new("PRIVMSG", 2);

/// Handler for PRIVMSG.
pub struct PrivmsgHandler;

#[async_trait]
impl Handler for PrivmsgHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &PRIVMSG_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        relay(ctx, msg, Kind::Privmsg).await
    }
}

static NOTICE_SPEC: HandlerSpec = HandlerSpec::new("NOTICE", 2);

/// Handler for NOTICE.
pub struct NoticeHandler;

#[async_trait]
impl Handler for NoticeHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &NOTICE_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        relay(ctx, msg, Kind::Notice).await
    }
}

static TAGMSG_SPEC: HandlerSpec = HandlerSpec::new("TAGMSG", 1);

/// Handler for TAGMSG (tags-only message).
pub struct TagmsgHandler;

#[async_trait]
impl Handler for TagmsgHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &TAGMSG_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        relay(ctx, msg, Kind::Tagmsg).await
    }
}

async fn relay(ctx: &mut Context<'_>, msg: &Message, kind: Kind) -> HandlerResult {
    if let Some(user) = ctx.network.users.get(ctx.uid) {
        user.write().await.last_activity = chrono::Utc::now().timestamp();
    }

    let targets = msg.arg_or_empty(0).to_string();
    let text = if kind == Kind::Tagmsg {
        String::new()
    } else {
        msg.arg_or_empty(1).to_string()
    };

    if kind == Kind::Privmsg && text.is_empty() {
        return ctx
            .numeric(Response::ERR_NOTEXTTOSEND, vec!["No text to send".to_string()])
            .await;
    }

    // Client-only tags ride along; everything else is ours to set.
    let client_tags: Vec<Tag> = msg
        .tags
        .iter()
        .flatten()
        .filter(|t| t.is_client_only())
        .cloned()
        .collect();

    for target in targets.split(',') {
        let target = target.trim();
        if target.is_empty() {
            continue;
        }
        if services::dispatch(ctx.network, ctx.uid, target, &text).await {
            continue;
        }
        if target.is_channel_name() {
            to_channel(ctx, target, &text, kind, &client_tags).await?;
        } else {
            to_nick(ctx, target, &text, kind, &client_tags).await?;
        }
    }
    Ok(())
}

async fn cannot_send(ctx: &Context<'_>, kind: Kind, channel: &str, why: &str) -> HandlerResult {
    if kind.silent() {
        return Ok(());
    }
    ctx.numeric(
        Response::ERR_CANNOTSENDTOCHAN,
        vec![channel.to_string(), format!("Cannot send to channel ({})", why)],
    )
    .await
}

async fn to_channel(
    ctx: &mut Context<'_>,
    name: &str,
    text: &str,
    kind: Kind,
    client_tags: &[Tag],
) -> HandlerResult {
    let Some(channel_arc) = ctx.network.channels.get(name) else {
        if kind.silent() {
            return Ok(());
        }
        return ctx
            .send(err_nosuchchannel(ctx.server_name(), ctx.nick(), name))
            .await;
    };

    let (account, ban_mask) = {
        let Some(user) = ctx.network.users.get(ctx.uid) else {
            return Ok(());
        };
        let user = user.read().await;
        (user.account.clone(), user.ban_mask())
    };

    let mut body = text.to_string();
    let (channel_name, members) = {
        let channel = channel_arc.read().await;
        let member = channel.member(ctx.uid);

        if channel.modes.no_external && member.is_none() {
            drop(channel);
            return cannot_send(ctx, kind, name, "no external messages").await;
        }
        if channel.modes.moderated
            && !member.map(|m| m.modes.has_voice_or_higher()).unwrap_or(false)
        {
            drop(channel);
            return cannot_send(ctx, kind, name, "+m").await;
        }
        if channel.is_banned(&ban_mask) {
            drop(channel);
            return cannot_send(ctx, kind, name, "banned").await;
        }
        if channel.modes.registered_only && account.is_none() {
            drop(channel);
            return cannot_send(ctx, kind, name, "+R").await;
        }
        if channel.modes.no_ctcp && is_ctcp(&body) && !is_action(&body) {
            drop(channel);
            return cannot_send(ctx, kind, name, "no CTCP").await;
        }
        if has_formatting(&body) {
            if channel.modes.no_colors {
                drop(channel);
                return cannot_send(ctx, kind, name, "no colors").await;
            }
            if channel.modes.strip_colors {
                body = strip_formatting(&body);
            }
        }

        (channel.name.clone(), channel.members.keys().cloned().collect::<Vec<_>>())
    };

    let msgid = uuid::Uuid::new_v4().to_string();
    let out = build_message(ctx, kind, &channel_name, &body, &msgid, account.as_deref(), client_tags)
        .await;
    let Some(out) = out else {
        return Ok(());
    };

    let echo = ctx.handshake.caps.has("echo-message");
    let except = if echo { None } else { Some(ctx.uid) };
    ctx.network.broker.send_to_many(members.iter(), &out, except);

    if kind != Kind::Tagmsg {
        store_history(ctx, &irc_to_lower(&channel_name), kind, &body, &msgid, account.as_deref())
            .await;
    }

    // Cross-server members hear it through the flood.
    let s2s = Message::new(kind.verb(), vec![channel_name, body])
        .with_prefix(Prefix::new(ctx.uid.to_string(), "", ""));
    ctx.network.links.broadcast(&s2s, None).await;
    Ok(())
}

async fn to_nick(
    ctx: &mut Context<'_>,
    target: &str,
    text: &str,
    kind: Kind,
    client_tags: &[Tag],
) -> HandlerResult {
    let Some(target_uid) = ctx.network.users.uid_of_nick(target) else {
        if kind.silent() {
            return Ok(());
        }
        return ctx
            .send(err_nosuchnick(ctx.server_name(), ctx.nick(), target))
            .await;
    };

    let account = match ctx.network.users.get(ctx.uid) {
        Some(user) => user.read().await.account.clone(),
        None => None,
    };

    // Caller-ID: +g recipients only hear accepted senders; opers bypass.
    let (target_nick, away, caller_id_blocked) = {
        let Some(target_user) = ctx.network.users.get(&target_uid) else {
            return Ok(());
        };
        let target_user = target_user.read().await;
        let blocked = target_user.modes.caller_id
            && !target_user.accepts(ctx.nick())
            && !ctx.handshake.is_oper;
        (
            target_user.nick.clone(),
            target_user.away.clone(),
            blocked,
        )
    };

    if caller_id_blocked {
        if kind.silent() {
            return Ok(());
        }
        return ctx
            .numeric(
                Response::RPL_TARGUMODEG,
                vec![
                    target_nick,
                    "is in +g mode (server-side ignore)".to_string(),
                ],
            )
            .await;
    }

    let msgid = uuid::Uuid::new_v4().to_string();
    let out = build_message(ctx, kind, &target_nick, text, &msgid, account.as_deref(), client_tags)
        .await;
    let Some(out) = out else {
        return Ok(());
    };

    if ctx.network.users.is_local(&target_uid) {
        ctx.network.broker.send_to_uid(&target_uid, &out);
    } else {
        // Route toward the owning server, addressed by UID.
        let mut remote = out.without_tags();
        remote.params[0] = target_uid.clone();
        ctx.network.links.send_to_uid_owner(&target_uid, remote).await;
    }

    if ctx.handshake.caps.has("echo-message") {
        ctx.network.broker.send_to_uid(ctx.uid, &out);
    }

    if kind == Kind::Privmsg {
        if let Some(away) = away {
            ctx.numeric(Response::RPL_AWAY, vec![target_nick.clone(), away])
                .await?;
        }
        store_history(ctx, &irc_to_lower(&target_nick), kind, text, &msgid, account.as_deref())
            .await;
    }
    Ok(())
}

async fn build_message(
    ctx: &Context<'_>,
    kind: Kind,
    target: &str,
    body: &str,
    msgid: &str,
    account: Option<&str>,
    client_tags: &[Tag],
) -> Option<Message> {
    let prefix = user_prefix(ctx.network, ctx.uid).await?;
    let params = match kind {
        Kind::Tagmsg => vec![target.to_string()],
        _ => vec![target.to_string(), body.to_string()],
    };
    let mut out = Message::new(kind.verb(), params).with_prefix(prefix);
    out = out
        .with_tag("time", Some(time_tag_now()))
        .with_tag("msgid", Some(msgid.to_string()));
    if let Some(account) = account {
        out = out.with_tag("account", Some(account.to_string()));
    }
    for tag in client_tags {
        out = out.with_tag(tag.0.clone(), tag.1.clone());
    }
    Some(out)
}

async fn store_history(
    ctx: &Context<'_>,
    target: &str,
    kind: Kind,
    body: &str,
    msgid: &str,
    account: Option<&str>,
) {
    let sender = match user_prefix(ctx.network, ctx.uid).await {
        Some(prefix) => prefix.to_string(),
        None => return,
    };
    let stored = StoredMessage {
        id: 0,
        msgid: msgid.to_string(),
        target: target.to_string(),
        sender,
        account: account.map(|a| a.to_string()),
        kind: kind.verb().to_string(),
        body: body.to_string(),
        sent_at: chrono::Utc::now().timestamp(),
    };
    if let Err(e) = ctx.network.db.messages().store(&stored).await {
        tracing::warn!(error = %e, "Failed to store message history");
    }
}
