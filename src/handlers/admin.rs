//! Administrative override handlers: SAJOIN, SAPART, SANICK, SAMODE.

use std::sync::Arc;

use async_trait::async_trait;
use corvus_proto::{ChannelExt, Message, Prefix, Response, irc_to_lower, is_valid_nick};
use tracing::info;

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec, err_nosuchnick, time_tag_now, user_prefix};
use crate::state::{MemberModes, Network};

static SAJOIN_SPEC: HandlerSpec = HandlerSpec::new("SAJOIN", 2).oper_only();

/// Handler for SAJOIN: force a user into a channel.
pub struct SajoinHandler;

#[async_trait]
impl Handler for SajoinHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &SAJOIN_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target_nick = msg.arg_or_empty(0).to_string();
        let name = msg.arg_or_empty(1).to_string();

        let Some(target_uid) = ctx.network.users.uid_of_nick(&target_nick) else {
            return ctx
                .send(err_nosuchnick(ctx.server_name(), ctx.nick(), &target_nick))
                .await;
        };
        if !name.is_channel_name() {
            return ctx
                .numeric(
                    Response::ERR_BADCHANMASK,
                    vec![name, "Bad Channel Mask".to_string()],
                )
                .await;
        }

        info!(oper = %ctx.nick(), target = %target_nick, channel = %name, "SAJOIN");
        force_join(ctx.network, &target_uid, &name).await;
        Ok(())
    }
}

/// Admission-check-free join used by administrative overrides.
pub async fn force_join(network: &Arc<Network>, target_uid: &str, name: &str) {
    let Some(target_nick) = network.users.get(target_uid) else {
        return;
    };
    let target_nick = target_nick.read().await.nick.clone();

    let (channel_arc, created) = network.channels.get_or_create(name);
    let initial = if created {
        MemberModes::op()
    } else {
        MemberModes::default()
    };
    {
        let mut channel = channel_arc.write().await;
        if !channel.add_member(target_uid, &target_nick, initial) {
            return;
        }
    }
    if let Some(user) = network.users.get(target_uid) {
        user.write()
            .await
            .join_channel(&irc_to_lower(name), initial.letters());
    }

    let join_msg = match user_prefix(network, target_uid).await {
        Some(prefix) => Message::new("JOIN", vec![name.to_string()])
            .with_prefix(prefix)
            .with_tag("time", Some(time_tag_now())),
        None => return,
    };
    network.send_to_channel(name, &join_msg, None).await;

    let channel_ts = channel_arc.read().await.created_at;
    let sjoin = Message::new(
        "SJOIN",
        vec![
            channel_ts.to_string(),
            name.to_string(),
            "+".to_string(),
            target_uid.to_string(),
        ],
    )
    .with_prefix(Prefix::ServerName(network.info.sid.clone()));
    network.links.broadcast(&sjoin, None).await;
}

static SAPART_SPEC: HandlerSpec = HandlerSpec::new("SAPART", 2).oper_only();

/// Handler for SAPART: force a user out of a channel.
pub struct SapartHandler;

#[async_trait]
impl Handler for SapartHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &SAPART_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target_nick = msg.arg_or_empty(0).to_string();
        let name = msg.arg_or_empty(1).to_string();

        let Some(target_uid) = ctx.network.users.uid_of_nick(&target_nick) else {
            return ctx
                .send(err_nosuchnick(ctx.server_name(), ctx.nick(), &target_nick))
                .await;
        };
        let Some(channel_arc) = ctx.network.channels.get(&name) else {
            return ctx
                .send(super::err_nosuchchannel(ctx.server_name(), ctx.nick(), &name))
                .await;
        };

        let is_member = channel_arc.read().await.members.contains_key(&target_uid);
        if !is_member {
            return ctx
                .numeric(
                    Response::ERR_USERNOTINCHANNEL,
                    vec![
                        target_nick,
                        name,
                        "They aren't on that channel".to_string(),
                    ],
                )
                .await;
        }

        info!(oper = %ctx.nick(), target = %target_nick, channel = %name, "SAPART");

        let part_msg = match user_prefix(ctx.network, &target_uid).await {
            Some(prefix) => Message::new(
                "PART",
                vec![name.clone(), "Requested by operator".to_string()],
            )
            .with_prefix(prefix),
            None => return Ok(()),
        };
        ctx.network.send_to_channel(&name, &part_msg, None).await;

        channel_arc.write().await.remove_member(&target_uid);
        if let Some(user) = ctx.network.users.get(&target_uid) {
            user.write().await.part_channel(&irc_to_lower(&name));
        }
        ctx.network.channels.remove_if_empty(&name).await;

        let s2s_part = Message::new("PART", vec![name])
            .with_prefix(Prefix::new(target_uid, "", ""));
        ctx.network.links.broadcast(&s2s_part, None).await;
        Ok(())
    }
}

static SANICK_SPEC: HandlerSpec = HandlerSpec::new("SANICK", 2).oper_only();

/// Handler for SANICK: force a nickname change.
pub struct SanickHandler;

#[async_trait]
impl Handler for SanickHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &SANICK_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let old_nick = msg.arg_or_empty(0).to_string();
        let new_nick = msg.arg_or_empty(1).to_string();

        let Some(target_uid) = ctx.network.users.uid_of_nick(&old_nick) else {
            return ctx
                .send(err_nosuchnick(ctx.server_name(), ctx.nick(), &old_nick))
                .await;
        };
        if !is_valid_nick(&new_nick, ctx.network.limits.max_nick_length) {
            return ctx
                .numeric(
                    Response::ERR_ERRONEUSNICKNAME,
                    vec![new_nick, "Erroneous nickname".to_string()],
                )
                .await;
        }
        if ctx
            .network
            .users
            .rename(&old_nick, &new_nick, &target_uid)
            .is_err()
        {
            return ctx
                .numeric(
                    Response::ERR_NICKNAMEINUSE,
                    vec![new_nick, "Nickname is already in use".to_string()],
                )
                .await;
        }

        info!(oper = %ctx.nick(), old = %old_nick, new = %new_nick, "SANICK");

        let nick_ts = chrono::Utc::now().timestamp();
        let (prefix, channels) = {
            let Some(user) = ctx.network.users.get(&target_uid) else {
                return Ok(());
            };
            let mut user = user.write().await;
            let prefix = Prefix::new(
                user.nick.clone(),
                user.ident.clone(),
                user.visible_host.clone(),
            );
            user.nick = new_nick.clone();
            user.nick_ts = nick_ts;
            (prefix, user.channels.keys().cloned().collect::<Vec<_>>())
        };
        for name in &channels {
            if let Some(channel) = ctx.network.channels.get(name) {
                if let Some(member) = channel.write().await.members.get_mut(&target_uid) {
                    member.nick = new_nick.clone();
                }
            }
        }

        let nick_msg = Message::new("NICK", vec![new_nick.clone()]).with_prefix(prefix);
        ctx.network.broker.send_to_uid(&target_uid, &nick_msg);
        let observers = ctx.network.common_channel_uids(&target_uid).await;
        ctx.network
            .broker
            .send_to_many(observers.iter(), &nick_msg, None);

        let s2s_nick = Message::new("NICK", vec![new_nick, nick_ts.to_string()])
            .with_prefix(Prefix::new(target_uid, "", ""));
        ctx.network.links.broadcast(&s2s_nick, None).await;
        Ok(())
    }
}

static SAMODE_SPEC: HandlerSpec = HandlerSpec::new("SAMODE", 2).oper_only();

/// Handler for SAMODE: set channel modes without privilege checks.
pub struct SamodeHandler;

#[async_trait]
impl Handler for SamodeHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &SAMODE_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let name = msg.arg_or_empty(0).to_string();
        let modestr = msg.arg_or_empty(1).to_string();
        let args: Vec<&str> = msg.params.iter().skip(2).map(String::as_str).collect();

        if !name.is_channel_name() {
            return ctx
                .numeric(
                    Response::ERR_BADCHANMASK,
                    vec![name, "Bad Channel Mask".to_string()],
                )
                .await;
        }

        info!(oper = %ctx.nick(), channel = %name, modes = %modestr, "SAMODE");
        let prefix = match user_prefix(ctx.network, ctx.uid).await {
            Some(prefix) => prefix,
            None => return Ok(()),
        };
        if let Err(e) =
            super::mode::apply_channel_mode_override(ctx.network, &name, &modestr, &args, &prefix)
                .await
        {
            return ctx
                .send(super::server_notice(ctx.server_name(), ctx.nick(), e))
                .await;
        }
        Ok(())
    }
}
