//! Connection and registration handlers: NICK, USER, PASS, QUIT, PING,
//! PONG, WEBIRC, plus registration completion.

use std::collections::HashSet;

use async_trait::async_trait;
use corvus_proto::{Message, Prefix, Response, is_valid_nick};
use tracing::{debug, info};

use crate::admin::UserEvent;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{Context, Handler, HandlerSpec, server_query};
use crate::security::cloak;
use crate::state::user::{User, UserParams};

static NICK_SPEC: HandlerSpec = HandlerSpec::new("NICK", 0).pre_registration();

/// Handler for NICK.
pub struct NickHandler;

#[async_trait]
impl Handler for NickHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &NICK_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Some(new_nick) = msg.arg(0).filter(|n| !n.is_empty()) else {
            return ctx
                .numeric(
                    Response::ERR_NONICKNAMEGIVEN,
                    vec!["No nickname given".to_string()],
                )
                .await;
        };
        let new_nick = new_nick.to_string();

        if !is_valid_nick(&new_nick, ctx.network.limits.max_nick_length) {
            return ctx
                .numeric(
                    Response::ERR_ERRONEUSNICKNAME,
                    vec![new_nick, "Erroneous nickname".to_string()],
                )
                .await;
        }

        // Reserved service nicknames are never claimable.
        if ctx.network.services.by_target(&new_nick).is_some() {
            return ctx
                .numeric(
                    Response::ERR_NICKNAMEINUSE,
                    vec![new_nick, "Nickname is already in use".to_string()],
                )
                .await;
        }

        if ctx.handshake.is_registered() {
            change_nick(ctx, &new_nick).await
        } else {
            let previous = ctx.handshake.nick.clone();
            match ctx.network.users.claim_nick(&new_nick, ctx.uid) {
                Ok(()) => {
                    if let Some(previous) = previous {
                        ctx.network.users.release_nick(&previous, ctx.uid);
                    }
                    ctx.handshake.nick = Some(new_nick);
                    try_complete_registration(ctx).await
                }
                Err(_) => {
                    ctx.numeric(
                        Response::ERR_NICKNAMEINUSE,
                        vec![new_nick, "Nickname is already in use".to_string()],
                    )
                    .await
                }
            }
        }
    }
}

/// Post-registration nickname change: re-index, cascade to channel member
/// records, notify observers and the network.
async fn change_nick(ctx: &mut Context<'_>, new_nick: &str) -> HandlerResult {
    let old_nick = ctx.handshake.nick.clone().unwrap_or_default();
    if old_nick == new_nick {
        return Ok(());
    }

    if ctx.network.users.rename(&old_nick, new_nick, ctx.uid).is_err() {
        return ctx
            .numeric(
                Response::ERR_NICKNAMEINUSE,
                vec![new_nick.to_string(), "Nickname is already in use".to_string()],
            )
            .await;
    }

    let nick_ts = chrono::Utc::now().timestamp();
    let (prefix, channels) = {
        let Some(user) = ctx.network.users.get(ctx.uid) else {
            return Ok(());
        };
        let mut user = user.write().await;
        let prefix = Prefix::new(user.nick.clone(), user.ident.clone(), user.visible_host.clone());
        user.nick = new_nick.to_string();
        user.nick_ts = nick_ts;
        (prefix, user.channels.keys().cloned().collect::<Vec<_>>())
    };

    // Cascade the cached nick into every member record.
    for name in &channels {
        if let Some(channel) = ctx.network.channels.get(name) {
            let mut channel = channel.write().await;
            if let Some(member) = channel.members.get_mut(ctx.uid) {
                member.nick = new_nick.to_string();
            }
        }
    }

    ctx.handshake.nick = Some(new_nick.to_string());

    let nick_msg = Message::new("NICK", vec![new_nick.to_string()]).with_prefix(prefix);
    ctx.send(nick_msg.clone()).await?;
    let observers = ctx.network.common_channel_uids(ctx.uid).await;
    ctx.network
        .broker
        .send_to_many(observers.iter(), &nick_msg, None);

    // Presence notifications for both names.
    let offline = Message::numeric(
        ctx.server_name(),
        Response::RPL_MONOFFLINE,
        vec!["*".to_string(), old_nick.clone()],
    );
    for watcher in ctx.network.monitors.watchers_of(&old_nick) {
        ctx.network.broker.send_to_uid(&watcher, &offline);
    }
    ctx.network.notify_monitors_online(new_nick);

    // Re-test bans: a K-line added since connect may name the new nick.
    enforce_bans_after_change(ctx).await?;

    let s2s_nick = Message::new(
        "NICK",
        vec![new_nick.to_string(), nick_ts.to_string()],
    )
    .with_prefix(Prefix::new(ctx.uid.to_string(), "", ""));
    ctx.network.links.broadcast(&s2s_nick, None).await;

    ctx.network.admin.user_event(UserEvent::NickChange {
        uid: ctx.uid.to_string(),
        old: old_nick,
        new: new_nick.to_string(),
    });
    Ok(())
}

async fn enforce_bans_after_change(ctx: &mut Context<'_>) -> HandlerResult {
    let Some(user) = ctx.network.users.get(ctx.uid) else {
        return Ok(());
    };
    let (usermask, ip) = {
        let user = user.read().await;
        (user.real_usermask(), user.ip.clone())
    };
    if let Some(ban) = ctx.network.bans.check_user(&usermask, &ip) {
        ctx.send(Message::error(format!(
            "Closing Link: {} ({})",
            ban.kind.as_str(),
            ban.reason
        )))
        .await?;
        return Err(HandlerError::AccessDenied);
    }
    Ok(())
}

static USER_SPEC: HandlerSpec = HandlerSpec::new("USER", 4).pre_registration();

/// Handler for USER.
pub struct UserHandler;

#[async_trait]
impl Handler for UserHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &USER_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.handshake.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        ctx.handshake.ident = Some(msg.arg_or_empty(0).to_string());
        ctx.handshake.realname = Some(msg.arg_or_empty(3).to_string());
        try_complete_registration(ctx).await
    }
}

static PASS_SPEC: HandlerSpec = HandlerSpec::new("PASS", 1).pre_registration();

/// Handler for PASS.
pub struct PassHandler;

#[async_trait]
impl Handler for PassHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &PASS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.handshake.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        ctx.handshake.password = Some(msg.arg_or_empty(0).to_string());
        Ok(())
    }
}

static QUIT_SPEC: HandlerSpec = HandlerSpec::new("QUIT", 0).pre_registration();

/// Handler for QUIT.
pub struct QuitHandler;

#[async_trait]
impl Handler for QuitHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &QUIT_SPEC
    }

    async fn handle(&self, _ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        Err(HandlerError::Quit(msg.arg(0).map(|s| s.to_string())))
    }
}

static PING_SPEC: HandlerSpec = HandlerSpec::new("PING", 1).pre_registration();

/// Handler for PING.
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &PING_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let token = msg.arg_or_empty(0).to_string();
        ctx.send(
            Message::pong(ctx.server_name(), token)
                .with_prefix(ctx.network.server_prefix()),
        )
        .await
    }
}

static PONG_SPEC: HandlerSpec = HandlerSpec::new("PONG", 0).pre_registration();

/// Handler for PONG. Liveness is tracked by the connection task; nothing
/// to do here.
pub struct PongHandler;

#[async_trait]
impl Handler for PongHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &PONG_SPEC
    }

    async fn handle(&self, _ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        Ok(())
    }
}

static WEBIRC_SPEC: HandlerSpec = HandlerSpec::new("WEBIRC", 4).pre_registration();

/// Handler for WEBIRC: `WEBIRC <password> <gateway> <hostname> <ip>`.
pub struct WebircHandler;

#[async_trait]
impl Handler for WebircHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &WEBIRC_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        if ctx.handshake.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        let password = msg.arg_or_empty(0);
        let hostname = msg.arg_or_empty(2);
        let ip = msg.arg_or_empty(3);

        let source_ip = ctx.handshake.peer_ip;
        let trusted = ctx
            .network
            .webirc_blocks
            .iter()
            .any(|block| block.password == password && block.trusted_source == source_ip);
        if !trusted {
            ctx.send(Message::error("Closing Link: WEBIRC not authorized"))
                .await?;
            return Err(HandlerError::AccessDenied);
        }

        ctx.handshake.webirc_host = Some(hostname.to_string());
        ctx.handshake.webirc_ip = Some(ip.to_string());
        debug!(gateway_ip = %source_ip, client_ip = %ip, "WEBIRC accepted");
        Ok(())
    }
}

/// Complete registration once NICK, USER, CAP and SASL have all settled.
///
/// Verifies PASS and server bans, creates the user record, registers the
/// outbound queue with the broker, emits the welcome burst, and
/// introduces the UID to the network.
pub async fn try_complete_registration(ctx: &mut Context<'_>) -> HandlerResult {
    if !ctx.handshake.can_register() {
        return Ok(());
    }

    // PASS gate, checked exactly once at completion.
    if let Some(required) = &ctx.network.server_password {
        if ctx.handshake.password.as_deref() != Some(required.as_str()) {
            ctx.numeric(
                Response::ERR_PASSWDMISMATCH,
                vec!["Password incorrect".to_string()],
            )
            .await?;
            ctx.send(Message::error("Closing Link: Bad password")).await?;
            return Err(HandlerError::AccessDenied);
        }
    }

    // User cap, distinct from the raw connection cap.
    if ctx.network.stats.snapshot().local_users >= ctx.network.limits.max_users {
        ctx.send(Message::error("Closing Link: Server is full")).await?;
        return Err(HandlerError::AccessDenied);
    }

    let nick = ctx.handshake.nick.clone().unwrap_or_default();
    let ident = ctx.handshake.ident.clone().unwrap_or_default();
    let realname = ctx.handshake.realname.clone().unwrap_or_default();

    let ip = ctx
        .handshake
        .webirc_ip
        .clone()
        .unwrap_or_else(|| ctx.handshake.peer_ip.to_string());
    let host = ctx.handshake.webirc_host.clone().unwrap_or_else(|| ip.clone());

    // Ban gate (K/G/Z) against the real host and IP.
    let usermask = format!("{}@{}", ident, host);
    if let Some(ban) = ctx.network.bans.check_user(&usermask, &ip) {
        ctx.send(Message::error(format!(
            "Closing Link: {} ({})",
            ban.kind.as_str(),
            ban.reason
        )))
        .await?;
        return Err(HandlerError::AccessDenied);
    }

    let visible_host = cloak::visible_host(
        &host,
        &ip,
        &ctx.network.security.cloak_secret,
        &ctx.network.security.cloak_suffix,
        ctx.network.security.cloak_hostnames,
    );

    let caps: HashSet<String> = ctx.handshake.cap_names();
    let account = ctx.handshake.account.clone();
    let nick_ts = chrono::Utc::now().timestamp();

    let user = User::new(UserParams {
        uid: ctx.uid.to_string(),
        nick: nick.clone(),
        nick_ts,
        ident: ident.clone(),
        realname: realname.clone(),
        host: host.clone(),
        ip: ip.clone(),
        visible_host: visible_host.clone(),
        account: account.clone(),
        caps: caps.clone(),
        certfp: ctx.handshake.certfp.clone(),
        secure: ctx.handshake.is_tls,
    });
    ctx.network.users.insert(user);
    ctx.network
        .broker
        .register(ctx.uid, ctx.sender.clone(), caps);
    ctx.handshake.complete();
    ctx.network.stats.user_registered();

    info!(uid = %ctx.uid, nick = %nick, host = %visible_host, "Client registered");

    send_welcome(ctx, &nick, &ident, &visible_host).await?;

    // Introduce the UID to the rest of the network.
    let umodes = if ctx.handshake.is_tls { "+Z" } else { "+" };
    let uid_msg = Message::new(
        "UID",
        vec![
            nick.clone(),
            "1".to_string(),
            nick_ts.to_string(),
            umodes.to_string(),
            ident,
            visible_host.clone(),
            ip,
            ctx.uid.to_string(),
            realname,
        ],
    )
    .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
    ctx.network.links.broadcast(&uid_msg, None).await;

    if let Some(account) = account {
        super::account::broadcast_login(ctx.network, ctx.uid, Some(&account)).await;
    }

    ctx.network.notify_monitors_online(&nick);
    ctx.network.admin.user_event(UserEvent::Connected {
        uid: ctx.uid.to_string(),
        nick,
        host: visible_host,
    });
    Ok(())
}

/// The 001-005 welcome burst, then LUSERS and MOTD.
async fn send_welcome(
    ctx: &Context<'_>,
    nick: &str,
    ident: &str,
    visible_host: &str,
) -> HandlerResult {
    let server = ctx.server_name().to_string();
    let network = ctx.network.info.network.clone();

    ctx.numeric(
        Response::RPL_WELCOME,
        vec![format!(
            "Welcome to {} {}!{}@{}",
            network, nick, ident, visible_host
        )],
    )
    .await?;
    ctx.numeric(
        Response::RPL_YOURHOST,
        vec![format!(
            "Your host is {}, running version corvusd-{}",
            server,
            env!("CARGO_PKG_VERSION")
        )],
    )
    .await?;
    let created = chrono::DateTime::from_timestamp(ctx.network.info.created_at, 0)
        .map(|t| t.format("%a %b %d %Y at %H:%M:%S UTC").to_string())
        .unwrap_or_default();
    ctx.numeric(
        Response::RPL_CREATED,
        vec![format!("This server was created {}", created)],
    )
    .await?;
    ctx.numeric(
        Response::RPL_MYINFO,
        vec![
            server,
            format!("corvusd-{}", env!("CARGO_PKG_VERSION")),
            "iwogrZBS".to_string(),
            "beIiklmnpstCcSR".to_string(),
            "beIklov".to_string(),
        ],
    )
    .await?;

    server_query::send_isupport(ctx).await?;
    server_query::send_lusers(ctx).await?;
    server_query::send_motd(ctx).await?;
    Ok(())
}
