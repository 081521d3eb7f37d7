//! User query handlers: WHO, WHOIS, WHOWAS, USERHOST, ISON.

use async_trait::async_trait;
use corvus_proto::{ChannelExt, Message, Response};

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec, err_nosuchnick};

static WHO_SPEC: HandlerSpec = HandlerSpec::new("WHO", 1);

/// Handler for WHO.
pub struct WhoHandler;

#[async_trait]
impl Handler for WhoHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &WHO_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let mask = msg.arg_or_empty(0).to_string();

        if mask.is_channel_name() {
            who_channel(ctx, &mask).await?;
        } else if let Some(user) = ctx.network.users.by_nick(&mask) {
            let row = {
                let user = user.read().await;
                who_row(ctx, "*", &user)
            };
            ctx.numeric(Response::RPL_WHOREPLY, row).await?;
        }

        ctx.numeric(
            Response::RPL_ENDOFWHO,
            vec![mask, "End of /WHO list".to_string()],
        )
        .await
    }
}

async fn who_channel(ctx: &Context<'_>, name: &str) -> HandlerResult {
    let Some(channel_arc) = ctx.network.channels.get(name) else {
        return Ok(());
    };
    let (channel_name, member_uids) = {
        let channel = channel_arc.read().await;
        if channel.modes.secret && !channel.members.contains_key(ctx.uid) && !ctx.handshake.is_oper
        {
            return Ok(());
        }
        (
            channel.name.clone(),
            channel.members.keys().cloned().collect::<Vec<_>>(),
        )
    };

    for uid in member_uids {
        let Some(user) = ctx.network.users.get(&uid) else {
            continue;
        };
        let prefix_chars = match ctx.network.channels.get(&channel_name) {
            Some(chan) => {
                let chan = chan.read().await;
                chan.member_modes(&uid)
                    .prefixes(ctx.handshake.caps.has("multi-prefix"))
            }
            None => String::new(),
        };
        let row = {
            let user = user.read().await;
            let mut row = who_row(ctx, &channel_name, &user);
            // Flags column: here/gone, oper, channel prefix.
            row[5] = format!(
                "{}{}{}",
                if user.away.is_some() { "G" } else { "H" },
                if user.modes.oper { "*" } else { "" },
                prefix_chars
            );
            row
        };
        ctx.numeric(Response::RPL_WHOREPLY, row).await?;
    }
    Ok(())
}

/// One RPL_WHOREPLY parameter row (after the nick).
fn who_row(ctx: &Context<'_>, channel: &str, user: &crate::state::User) -> Vec<String> {
    vec![
        channel.to_string(),
        user.ident.clone(),
        user.visible_host.clone(),
        ctx.server_name().to_string(),
        user.nick.clone(),
        format!(
            "{}{}",
            if user.away.is_some() { "G" } else { "H" },
            if user.modes.oper { "*" } else { "" }
        ),
        format!("0 {}", user.realname),
    ]
}

static WHOIS_SPEC: HandlerSpec = HandlerSpec::new("WHOIS", 1);

/// Handler for WHOIS.
pub struct WhoisHandler;

#[async_trait]
impl Handler for WhoisHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &WHOIS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        // WHOIS [server] <nick>: the last parameter is the nick list.
        let target = msg
            .params
            .last()
            .cloned()
            .unwrap_or_default();
        let target = target.split(',').next().unwrap_or("").to_string();

        let Some(user_arc) = ctx.network.users.by_nick(&target) else {
            ctx.send(err_nosuchnick(ctx.server_name(), ctx.nick(), &target))
                .await?;
            return ctx
                .numeric(
                    Response::RPL_ENDOFWHOIS,
                    vec![target, "End of /WHOIS list".to_string()],
                )
                .await;
        };

        let (nick, ident, host, realname, channels, account, oper, secure, connected_at, last_activity, away) = {
            let user = user_arc.read().await;
            (
                user.nick.clone(),
                user.ident.clone(),
                user.visible_host.clone(),
                user.realname.clone(),
                user.channels.clone(),
                user.account.clone(),
                user.modes.oper,
                user.modes.secure,
                user.connected_at,
                user.last_activity,
                user.away.clone(),
            )
        };

        ctx.numeric(
            Response::RPL_WHOISUSER,
            vec![
                nick.clone(),
                ident,
                host,
                "*".to_string(),
                realname,
            ],
        )
        .await?;

        // Channel list with highest prefixes, hiding secret channels from
        // strangers.
        let mut shown = Vec::new();
        for (name, _) in channels {
            let Some(channel_arc) = ctx.network.channels.get(&name) else {
                continue;
            };
            let channel = channel_arc.read().await;
            if channel.modes.secret
                && !channel.members.contains_key(ctx.uid)
                && !ctx.handshake.is_oper
            {
                continue;
            }
            let uid = {
                let u = user_arc.read().await;
                u.uid.clone()
            };
            let prefix = channel.member_modes(&uid).prefixes(false);
            shown.push(format!("{}{}", prefix, channel.name));
        }
        if !shown.is_empty() {
            ctx.numeric(
                Response::RPL_WHOISCHANNELS,
                vec![nick.clone(), shown.join(" ")],
            )
            .await?;
        }

        let description = ctx.network.hot_config.read().description.clone();
        ctx.numeric(
            Response::RPL_WHOISSERVER,
            vec![nick.clone(), ctx.server_name().to_string(), description],
        )
        .await?;

        if let Some(away) = away {
            ctx.numeric(Response::RPL_AWAY, vec![nick.clone(), away]).await?;
        }
        if oper {
            ctx.numeric(
                Response::RPL_WHOISOPERATOR,
                vec![nick.clone(), "is an IRC operator".to_string()],
            )
            .await?;
        }
        if let Some(account) = account {
            ctx.numeric(
                Response::RPL_WHOISACCOUNT,
                vec![nick.clone(), account, "is logged in as".to_string()],
            )
            .await?;
        }
        if secure {
            ctx.numeric(
                Response::RPL_WHOISSECURE,
                vec![nick.clone(), "is using a secure connection".to_string()],
            )
            .await?;
        }

        let idle = chrono::Utc::now().timestamp().saturating_sub(last_activity);
        ctx.numeric(
            Response::RPL_WHOISIDLE,
            vec![
                nick.clone(),
                idle.to_string(),
                connected_at.to_string(),
                "seconds idle, signon time".to_string(),
            ],
        )
        .await?;

        ctx.numeric(
            Response::RPL_ENDOFWHOIS,
            vec![nick, "End of /WHOIS list".to_string()],
        )
        .await
    }
}

static WHOWAS_SPEC: HandlerSpec = HandlerSpec::new("WHOWAS", 1);

/// Handler for WHOWAS.
pub struct WhowasHandler;

#[async_trait]
impl Handler for WhowasHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &WHOWAS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg_or_empty(0).to_string();
        let count: usize = msg
            .arg(1)
            .and_then(|c| c.parse().ok())
            .filter(|c| *c > 0)
            .unwrap_or(ctx.network.limits.whowas_depth);

        let entries = ctx.network.whowas.lookup(&target, count);
        if entries.is_empty() {
            ctx.numeric(
                Response::ERR_WASNOSUCHNICK,
                vec![target.clone(), "There was no such nickname".to_string()],
            )
            .await?;
        }
        for entry in entries {
            ctx.numeric(
                Response::RPL_WHOWASUSER,
                vec![
                    entry.nick.clone(),
                    entry.ident,
                    entry.host,
                    "*".to_string(),
                    entry.realname,
                ],
            )
            .await?;
        }
        ctx.numeric(
            Response::RPL_ENDOFWHOWAS,
            vec![target, "End of WHOWAS".to_string()],
        )
        .await
    }
}

static USERHOST_SPEC: HandlerSpec = HandlerSpec::new("USERHOST", 1);

/// Handler for USERHOST.
pub struct UserhostHandler;

#[async_trait]
impl Handler for UserhostHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &USERHOST_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let mut replies = Vec::new();
        for nick in msg.params.iter().take(5) {
            let Some(user) = ctx.network.users.by_nick(nick) else {
                continue;
            };
            let user = user.read().await;
            replies.push(format!(
                "{}{}={}{}@{}",
                user.nick,
                if user.modes.oper { "*" } else { "" },
                if user.away.is_some() { "-" } else { "+" },
                user.ident,
                user.visible_host
            ));
        }
        ctx.numeric(Response::RPL_USERHOST, vec![replies.join(" ")]).await
    }
}

static ISON_SPEC: HandlerSpec = HandlerSpec::new("ISON", 1);

/// Handler for ISON.
pub struct IsonHandler;

#[async_trait]
impl Handler for IsonHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &ISON_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let mut online = Vec::new();
        for nick in &msg.params {
            for nick in nick.split_ascii_whitespace() {
                if ctx.network.users.nick_in_use(nick) {
                    online.push(nick.to_string());
                }
            }
        }
        ctx.numeric(Response::RPL_ISON, vec![online.join(" ")]).await
    }
}
