//! Channel command handlers: JOIN, PART, KICK, TOPIC, INVITE, NAMES, LIST.

use async_trait::async_trait;
use corvus_proto::chan::is_valid_channel_name;
use corvus_proto::{ChannelExt, Message, Prefix, Response, irc_to_lower};
use tracing::debug;

use crate::admin::UserEvent;
use crate::error::HandlerResult;
use crate::handlers::{
    Context, Handler, HandlerSpec, err_chanoprivsneeded, err_nosuchchannel, err_notonchannel,
    time_tag_now, user_prefix,
};
use crate::state::MemberModes;

static JOIN_SPEC: HandlerSpec = HandlerSpec::new("JOIN", 1);

/// Handler for JOIN.
pub struct JoinHandler;

#[async_trait]
impl Handler for JoinHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &JOIN_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let channels = msg.arg_or_empty(0).to_string();
        let keys: Vec<&str> = msg.arg_or_empty(1).split(',').collect();

        // JOIN 0 parts everything.
        if channels == "0" {
            return part_all(ctx).await;
        }

        for (i, name) in channels.split(',').enumerate() {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let key = keys.get(i).copied().filter(|k| !k.is_empty());
            join_one(ctx, name, key).await?;
        }
        Ok(())
    }
}

async fn join_one(ctx: &mut Context<'_>, name: &str, key: Option<&str>) -> HandlerResult {
    if !is_valid_channel_name(name, ctx.network.limits.max_channel_length) {
        return ctx
            .numeric(
                Response::ERR_BADCHANMASK,
                vec![name.to_string(), "Bad Channel Mask".to_string()],
            )
            .await;
    }

    let (nick, account, realname, ban_mask, channel_count) = {
        let Some(user) = ctx.network.users.get(ctx.uid) else {
            return Ok(());
        };
        let user = user.read().await;
        (
            user.nick.clone(),
            user.account.clone(),
            user.realname.clone(),
            user.ban_mask(),
            user.channels.len(),
        )
    };

    if channel_count >= ctx.network.limits.max_channels_per_user {
        return ctx
            .numeric(
                Response::ERR_TOOMANYCHANNELS,
                vec![
                    name.to_string(),
                    "You have joined too many channels".to_string(),
                ],
            )
            .await;
    }

    let exists = ctx.network.channels.get(name).is_some();
    if !exists && !ctx.network.allow_channel_creation && !ctx.handshake.is_oper {
        return ctx
            .send(err_nosuchchannel(ctx.server_name(), &nick, name))
            .await;
    }

    let (channel_arc, created) = ctx.network.channels.get_or_create(name);
    let initial_modes = if created {
        MemberModes::op()
    } else {
        MemberModes::default()
    };

    // Admission checks and membership mutation under one channel lock.
    let channel_ts;
    {
        let mut channel = channel_arc.write().await;

        if channel.members.contains_key(ctx.uid) {
            return Ok(());
        }

        if !created {
            if channel.modes.invite_only
                && !channel.invited.contains(ctx.uid)
                && !channel.matches_invite_exception(&ban_mask)
            {
                return ctx
                    .numeric(
                        Response::ERR_INVITEONLYCHAN,
                        vec![
                            channel.name.clone(),
                            "Cannot join channel (+i)".to_string(),
                        ],
                    )
                    .await;
            }
            if let Some(required) = &channel.modes.key {
                if key != Some(required.as_str()) {
                    return ctx
                        .numeric(
                            Response::ERR_BADCHANNELKEY,
                            vec![
                                channel.name.clone(),
                                "Cannot join channel (+k)".to_string(),
                            ],
                        )
                        .await;
                }
            }
            if channel.is_banned(&ban_mask) {
                return ctx
                    .numeric(
                        Response::ERR_BANNEDFROMCHAN,
                        vec![
                            channel.name.clone(),
                            "Cannot join channel (+b)".to_string(),
                        ],
                    )
                    .await;
            }
            let hard_limit = ctx.network.limits.max_users_per_channel;
            let full = channel
                .modes
                .limit
                .is_some_and(|l| channel.member_count() >= l as usize)
                || channel.member_count() >= hard_limit;
            if full {
                return ctx
                    .numeric(
                        Response::ERR_CHANNELISFULL,
                        vec![
                            channel.name.clone(),
                            "Cannot join channel (+l)".to_string(),
                        ],
                    )
                    .await;
            }
            if channel.modes.registered_only && account.is_none() {
                return ctx
                    .numeric(
                        Response::ERR_NEEDREGGEDNICK,
                            vec![
                            channel.name.clone(),
                            "Cannot join channel (+R): you must identify to services".to_string(),
                        ],
                    )
                    .await;
            }
        }

        channel.add_member(ctx.uid, &nick, initial_modes);
        channel_ts = channel.created_at;
    }

    if let Some(user) = ctx.network.users.get(ctx.uid) {
        user.write()
            .await
            .join_channel(&irc_to_lower(name), initial_modes.letters());
    }

    debug!(uid = %ctx.uid, channel = %name, created = created, "Join");

    broadcast_join(ctx, name, account.as_deref(), &realname).await;

    // Topic, then NAMES, to the joiner.
    {
        let channel = channel_arc.read().await;
        if let Some(topic) = &channel.topic {
            ctx.numeric(
                Response::RPL_TOPIC,
                vec![channel.name.clone(), topic.text.clone()],
            )
            .await?;
            ctx.numeric(
                Response::RPL_TOPICWHOTIME,
                vec![
                    channel.name.clone(),
                    topic.set_by.clone(),
                    topic.set_at.to_string(),
                ],
            )
            .await?;
        }
    }
    send_names(ctx, name).await?;

    // Introduce the membership to the network.
    let flags = if created { "@" } else { "" };
    let sjoin = Message::new(
        "SJOIN",
        vec![
            channel_ts.to_string(),
            name.to_string(),
            "+".to_string(),
            format!("{}{}", flags, ctx.uid),
        ],
    )
    .with_prefix(Prefix::ServerName(ctx.network.info.sid.clone()));
    ctx.network.links.broadcast(&sjoin, None).await;

    ctx.network.admin.user_event(UserEvent::Join {
        uid: ctx.uid.to_string(),
        nick: nick.clone(),
        channel: name.to_string(),
    });

    send_bot_greeting(ctx, name, &nick).await;
    Ok(())
}

/// JOIN fan-out with per-recipient extended-join form and time/account tags.
async fn broadcast_join(ctx: &Context<'_>, name: &str, account: Option<&str>, realname: &str) {
    let Some(prefix) = user_prefix(ctx.network, ctx.uid).await else {
        return;
    };

    let plain = Message::new("JOIN", vec![name.to_string()])
        .with_prefix(prefix.clone())
        .with_tag("time", Some(time_tag_now()))
        .with_tag("account", account.map(|a| a.to_string()));
    let extended = Message::new(
        "JOIN",
        vec![
            name.to_string(),
            account.unwrap_or("*").to_string(),
            realname.to_string(),
        ],
    )
    .with_prefix(prefix)
    .with_tag("time", Some(time_tag_now()))
    .with_tag("account", account.map(|a| a.to_string()));

    let members: Vec<String> = match ctx.network.channels.get(name) {
        Some(channel) => channel.read().await.members.keys().cloned().collect(),
        None => return,
    };
    for member in members {
        if ctx.network.broker.has_cap(&member, "extended-join") {
            ctx.network.broker.send_to_uid(&member, &extended);
        } else {
            ctx.network.broker.send_to_uid(&member, &plain);
        }
    }
}

/// RPL_NAMREPLY + RPL_ENDOFNAMES for one channel, honoring multi-prefix
/// and userhost-in-names for the requesting connection.
pub async fn send_names(ctx: &Context<'_>, name: &str) -> HandlerResult {
    let Some(channel_arc) = ctx.network.channels.get(name) else {
        return ctx
            .numeric(
                Response::RPL_ENDOFNAMES,
                vec![name.to_string(), "End of /NAMES list".to_string()],
            )
            .await;
    };

    let multi_prefix = ctx.handshake.caps.has("multi-prefix");
    let userhost = ctx.handshake.caps.has("userhost-in-names");

    let (channel_name, symbol, entries) = {
        let channel = channel_arc.read().await;
        // Non-members see nothing of a secret channel.
        if channel.modes.secret && !channel.members.contains_key(ctx.uid) {
            return ctx
                .numeric(
                    Response::RPL_ENDOFNAMES,
                    vec![name.to_string(), "End of /NAMES list".to_string()],
                )
                .await;
        }
        let symbol = if channel.modes.secret { "@" } else { "=" };
        let mut entries = Vec::with_capacity(channel.member_count());
        for member in channel.members.values() {
            entries.push((member.uid.clone(), member.nick.clone(), member.modes));
        }
        (channel.name.clone(), symbol, entries)
    };

    let mut names = Vec::with_capacity(entries.len());
    for (uid, nick, modes) in entries {
        let shown = if userhost {
            match user_prefix(ctx.network, &uid).await {
                Some(prefix) => prefix.to_string(),
                None => nick,
            }
        } else {
            nick
        };
        names.push(format!("{}{}", modes.prefixes(multi_prefix), shown));
    }

    // 353 lines stay under the 512-byte cap; chunk conservatively.
    for chunk in names.chunks(12) {
        ctx.numeric(
            Response::RPL_NAMREPLY,
            vec![
                symbol.to_string(),
                channel_name.clone(),
                chunk.join(" "),
            ],
        )
        .await?;
    }
    ctx.numeric(
        Response::RPL_ENDOFNAMES,
        vec![channel_name, "End of /NAMES list".to_string()],
    )
    .await
}

async fn send_bot_greeting(ctx: &Context<'_>, name: &str, nick: &str) {
    let Ok(Some(assignment)) = ctx.network.db.channel_bots().for_channel(name).await else {
        return;
    };
    if !assignment.greet_enabled {
        return;
    }
    let Some(greeting) = assignment.greet_msg else {
        return;
    };
    let Ok(Some(bot)) = ctx.network.db.bots().get_by_id(assignment.bot_id).await else {
        return;
    };
    let msg = Message::privmsg(name, format!("[{}] {}", nick, greeting))
        .with_prefix(Prefix::new(bot.nick, bot.ident, bot.host));
    ctx.network.send_to_channel(name, &msg, None).await;
}

async fn part_all(ctx: &mut Context<'_>) -> HandlerResult {
    let channels: Vec<String> = match ctx.network.users.get(ctx.uid) {
        Some(user) => user.read().await.channels.keys().cloned().collect(),
        None => Vec::new(),
    };
    for name in channels {
        part_one(ctx, &name, None).await?;
    }
    Ok(())
}

static PART_SPEC: HandlerSpec = HandlerSpec::new("PART", 1);

/// Handler for PART.
pub struct PartHandler;

#[async_trait]
impl Handler for PartHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &PART_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let channels = msg.arg_or_empty(0).to_string();
        let reason = msg.arg(1).map(|s| s.to_string());
        for name in channels.split(',') {
            let name = name.trim();
            if !name.is_empty() {
                part_one(ctx, name, reason.as_deref()).await?;
            }
        }
        Ok(())
    }
}

async fn part_one(ctx: &mut Context<'_>, name: &str, reason: Option<&str>) -> HandlerResult {
    let nick = ctx.nick().to_string();
    let Some(channel_arc) = ctx.network.channels.get(name) else {
        return ctx
            .send(err_nosuchchannel(ctx.server_name(), &nick, name))
            .await;
    };

    let channel_name = {
        let channel = channel_arc.read().await;
        if !channel.members.contains_key(ctx.uid) {
            drop(channel);
            return ctx
                .send(err_notonchannel(ctx.server_name(), &nick, name))
                .await;
        }
        channel.name.clone()
    };

    let mut params = vec![channel_name.clone()];
    if let Some(reason) = reason {
        params.push(reason.to_string());
    }
    let part_msg = match user_prefix(ctx.network, ctx.uid).await {
        Some(prefix) => Message::new("PART", params).with_prefix(prefix),
        None => return Ok(()),
    };
    ctx.network.send_to_channel(name, &part_msg, None).await;

    channel_arc.write().await.remove_member(ctx.uid);
    if let Some(user) = ctx.network.users.get(ctx.uid) {
        user.write().await.part_channel(&irc_to_lower(name));
    }
    ctx.network.channels.remove_if_empty(name).await;

    let mut s2s_params = vec![channel_name.clone()];
    if let Some(reason) = reason {
        s2s_params.push(reason.to_string());
    }
    let s2s_part = Message::new("PART", s2s_params)
        .with_prefix(Prefix::new(ctx.uid.to_string(), "", ""));
    ctx.network.links.broadcast(&s2s_part, None).await;

    ctx.network.admin.user_event(UserEvent::Part {
        uid: ctx.uid.to_string(),
        nick,
        channel: channel_name,
    });
    Ok(())
}

static KICK_SPEC: HandlerSpec = HandlerSpec::new("KICK", 2);

/// Handler for KICK.
pub struct KickHandler;

#[async_trait]
impl Handler for KickHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &KICK_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let name = msg.arg_or_empty(0).to_string();
        let target_nick = msg.arg_or_empty(1).to_string();
        let nick = ctx.nick().to_string();
        let reason = msg
            .arg(2)
            .map(|s| s.to_string())
            .unwrap_or_else(|| nick.clone());

        let Some(channel_arc) = ctx.network.channels.get(&name) else {
            return ctx
                .send(err_nosuchchannel(ctx.server_name(), &nick, &name))
                .await;
        };
        let Some(target_uid) = ctx.network.users.uid_of_nick(&target_nick) else {
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
        };

        let channel_name;
        {
            let channel = channel_arc.read().await;
            let Some(kicker) = channel.member(ctx.uid) else {
                drop(channel);
                return ctx
                    .send(err_notonchannel(ctx.server_name(), &nick, &name))
                    .await;
            };
            let Some(target) = channel.member(&target_uid) else {
                drop(channel);
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
            };
            if !kicker.modes.has_halfop_or_higher()
                || kicker.modes.rank() < target.modes.rank()
            {
                drop(channel);
                return ctx
                    .send(err_chanoprivsneeded(ctx.server_name(), &nick, &name))
                    .await;
            }
            channel_name = channel.name.clone();
        }

        let kick_msg = match user_prefix(ctx.network, ctx.uid).await {
            Some(prefix) => Message::new(
                "KICK",
                vec![channel_name.clone(), target_nick.clone(), reason.clone()],
            )
            .with_prefix(prefix),
            None => return Ok(()),
        };
        ctx.network.send_to_channel(&name, &kick_msg, None).await;

        channel_arc.write().await.remove_member(&target_uid);
        if let Some(user) = ctx.network.users.get(&target_uid) {
            user.write().await.part_channel(&irc_to_lower(&name));
        }
        ctx.network.channels.remove_if_empty(&name).await;

        let s2s_kick = Message::new(
            "KICK",
            vec![channel_name, target_uid, reason],
        )
        .with_prefix(Prefix::new(ctx.uid.to_string(), "", ""));
        ctx.network.links.broadcast(&s2s_kick, None).await;
        Ok(())
    }
}

static TOPIC_SPEC: HandlerSpec = HandlerSpec::new("TOPIC", 1);

/// Handler for TOPIC.
pub struct TopicHandler;

#[async_trait]
impl Handler for TopicHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &TOPIC_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let name = msg.arg_or_empty(0).to_string();
        let nick = ctx.nick().to_string();
        let Some(channel_arc) = ctx.network.channels.get(&name) else {
            return ctx
                .send(err_nosuchchannel(ctx.server_name(), &nick, &name))
                .await;
        };

        // Query form.
        let Some(new_topic) = msg.arg(1) else {
            let (channel_name, topic) = {
                let channel = channel_arc.read().await;
                (channel.name.clone(), channel.topic.clone())
            };
            return match topic {
                Some(topic) => {
                    ctx.numeric(
                        Response::RPL_TOPIC,
                        vec![channel_name.clone(), topic.text],
                    )
                    .await?;
                    ctx.numeric(
                        Response::RPL_TOPICWHOTIME,
                        vec![channel_name, topic.set_by, topic.set_at.to_string()],
                    )
                    .await
                }
                None => {
                    ctx.numeric(
                        Response::RPL_NOTOPIC,
                        vec![channel_name, "No topic is set".to_string()],
                    )
                    .await
                }
            };
        };

        let mut new_topic = new_topic.to_string();
        new_topic.truncate(ctx.network.limits.max_topic_length);

        let channel_name;
        {
            let mut channel = channel_arc.write().await;
            let Some(member) = channel.member(ctx.uid) else {
                drop(channel);
                return ctx
                    .send(err_notonchannel(ctx.server_name(), &nick, &name))
                    .await;
            };
            if channel.modes.topic_protected && !member.modes.has_halfop_or_higher() {
                drop(channel);
                return ctx
                    .send(err_chanoprivsneeded(ctx.server_name(), &nick, &name))
                    .await;
            }
            channel.set_topic(new_topic.clone(), nick.clone());
            channel_name = channel.name.clone();
        }

        let topic_msg = match user_prefix(ctx.network, ctx.uid).await {
            Some(prefix) => Message::new(
                "TOPIC",
                vec![channel_name.clone(), new_topic.clone()],
            )
            .with_prefix(prefix),
            None => return Ok(()),
        };
        ctx.network.send_to_channel(&name, &topic_msg, None).await;

        let s2s_topic = Message::new("TOPIC", vec![channel_name, new_topic])
            .with_prefix(Prefix::new(ctx.uid.to_string(), "", ""));
        ctx.network.links.broadcast(&s2s_topic, None).await;
        Ok(())
    }
}

static INVITE_SPEC: HandlerSpec = HandlerSpec::new("INVITE", 2);

/// Handler for INVITE.
pub struct InviteHandler;

#[async_trait]
impl Handler for InviteHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &INVITE_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target_nick = msg.arg_or_empty(0).to_string();
        let name = msg.arg_or_empty(1).to_string();
        let nick = ctx.nick().to_string();

        let Some(target_uid) = ctx.network.users.uid_of_nick(&target_nick) else {
            return ctx
                .send(super::err_nosuchnick(ctx.server_name(), &nick, &target_nick))
                .await;
        };
        let Some(channel_arc) = ctx.network.channels.get(&name) else {
            return ctx
                .send(err_nosuchchannel(ctx.server_name(), &nick, &name))
                .await;
        };

        let channel_name;
        {
            let mut channel = channel_arc.write().await;
            let Some(inviter) = channel.member(ctx.uid) else {
                drop(channel);
                return ctx
                    .send(err_notonchannel(ctx.server_name(), &nick, &name))
                    .await;
            };
            if channel.members.contains_key(&target_uid) {
                let channel_name = channel.name.clone();
                drop(channel);
                return ctx
                    .numeric(
                        Response::ERR_USERONCHANNEL,
                        vec![
                            target_nick,
                            channel_name,
                            "is already on channel".to_string(),
                        ],
                    )
                    .await;
            }
            if channel.modes.invite_only && !inviter.modes.has_halfop_or_higher() {
                drop(channel);
                return ctx
                    .send(err_chanoprivsneeded(ctx.server_name(), &nick, &name))
                    .await;
            }
            channel.invited.insert(target_uid.clone());
            channel_name = channel.name.clone();
        }

        ctx.numeric(
            Response::RPL_INVITING,
            vec![target_nick.clone(), channel_name.clone()],
        )
        .await?;

        let invite_msg = match user_prefix(ctx.network, ctx.uid).await {
            Some(prefix) => Message::new(
                "INVITE",
                vec![target_nick.clone(), channel_name.clone()],
            )
            .with_prefix(prefix)
            .with_tag("time", Some(time_tag_now())),
            None => return Ok(()),
        };
        ctx.network.broker.send_to_uid(&target_uid, &invite_msg);

        // invite-notify to privileged members that asked for it.
        let members: Vec<String> = channel_arc
            .read()
            .await
            .members
            .values()
            .filter(|m| m.modes.has_halfop_or_higher())
            .map(|m| m.uid.clone())
            .collect();
        for member in members {
            if member != ctx.uid && ctx.network.broker.has_cap(&member, "invite-notify") {
                ctx.network.broker.send_to_uid(&member, &invite_msg);
            }
        }
        Ok(())
    }
}

static NAMES_SPEC: HandlerSpec = HandlerSpec::new("NAMES", 0);

/// Handler for NAMES.
pub struct NamesHandler;

#[async_trait]
impl Handler for NamesHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &NAMES_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let names: Vec<String> = match msg.arg(0) {
            Some(list) => list.split(',').map(|s| s.to_string()).collect(),
            None => match ctx.network.users.get(ctx.uid) {
                Some(user) => user.read().await.channels.keys().cloned().collect(),
                None => Vec::new(),
            },
        };
        for name in names {
            send_names(ctx, &name).await?;
        }
        Ok(())
    }
}

static LIST_SPEC: HandlerSpec = HandlerSpec::new("LIST", 0);

/// Handler for LIST.
pub struct ListHandler;

#[async_trait]
impl Handler for ListHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &LIST_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let filter: Option<Vec<String>> = msg
            .arg(0)
            .map(|list| list.split(',').map(irc_to_lower).collect());

        ctx.numeric(
            Response::RPL_LISTSTART,
            vec!["Channel".to_string(), "Users  Name".to_string()],
        )
        .await?;

        for key in ctx.network.channels.names() {
            if let Some(filter) = &filter {
                if !filter.contains(&key) {
                    continue;
                }
            }
            let Some(channel_arc) = ctx.network.channels.get(&key) else {
                continue;
            };
            let channel = channel_arc.read().await;
            let hidden = (channel.modes.secret || channel.modes.private_)
                && !channel.members.contains_key(ctx.uid)
                && !ctx.handshake.is_oper;
            if hidden {
                continue;
            }
            let row = (
                channel.name.clone(),
                channel.member_count().to_string(),
                channel
                    .topic
                    .as_ref()
                    .map(|t| t.text.clone())
                    .unwrap_or_default(),
            );
            drop(channel);
            ctx.numeric(Response::RPL_LIST, vec![row.0, row.1, row.2]).await?;
        }

        ctx.numeric(Response::RPL_LISTEND, vec!["End of /LIST".to_string()])
            .await
    }
}
