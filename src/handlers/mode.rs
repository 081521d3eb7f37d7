//! MODE handler: channel modes (types A/B/C/D) and user modes.

use std::sync::Arc;

use async_trait::async_trait;
use corvus_proto::mode::{ModeChange, format_mode_changes, parse_channel_modes, parse_user_modes};
use corvus_proto::{ChannelExt, Message, Prefix, Response, irc_to_lower};

use crate::error::HandlerResult;
use crate::handlers::{
    Context, Handler, HandlerSpec, err_chanoprivsneeded, err_nosuchchannel, user_prefix,
};
use crate::state::Network;

static MODE_SPEC: HandlerSpec = HandlerSpec::new("MODE", 1);

/// Handler for MODE.
pub struct ModeHandler;

#[async_trait]
impl Handler for ModeHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &MODE_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let target = msg.arg_or_empty(0).to_string();
        if target.is_channel_name() {
            channel_mode(ctx, &target, msg).await
        } else {
            user_mode(ctx, &target, msg).await
        }
    }
}

/// Minimum member rank needed to apply a given channel mode letter.
fn required_rank(letter: char) -> u8 {
    match letter {
        // Owner and admin status are guarded by ownership.
        'q' | 'a' => 5,
        // Voice and the list modes are within a halfop's reach.
        'v' | 'b' | 'e' | 'I' => 2,
        // Everything else wants full ops.
        _ => 3,
    }
}

async fn channel_mode(ctx: &mut Context<'_>, name: &str, msg: &Message) -> HandlerResult {
    let nick = ctx.nick().to_string();
    let Some(channel_arc) = ctx.network.channels.get(name) else {
        return ctx
            .send(err_nosuchchannel(ctx.server_name(), &nick, name))
            .await;
    };

    // Query form: current modes + creation time.
    let Some(modestr) = msg.arg(1) else {
        let channel = channel_arc.read().await;
        let is_member = channel.members.contains_key(ctx.uid);
        let (modes, args) = channel.modes.as_mode_string(is_member || ctx.handshake.is_oper);
        let (channel_name, created_at) = (channel.name.clone(), channel.created_at);
        drop(channel);

        let mut params = vec![channel_name.clone(), modes];
        params.extend(args);
        ctx.numeric(Response::RPL_CHANNELMODEIS, params).await?;
        return ctx
            .numeric(
                Response::RPL_CREATIONTIME,
                vec![channel_name, created_at.to_string()],
            )
            .await;
    };

    let extra_args: Vec<&str> = msg.params.iter().skip(2).map(String::as_str).collect();
    let parsed = match parse_channel_modes(modestr, &extra_args) {
        Ok(parsed) => parsed,
        Err(_) => return Ok(()),
    };

    for letter in &parsed.unknown {
        ctx.numeric(
            Response::ERR_UNKNOWNMODE,
            vec![
                letter.to_string(),
                "is unknown mode char to me".to_string(),
            ],
        )
        .await?;
    }

    // List queries before any mutation.
    for letter in &parsed.list_queries {
        send_mode_list(ctx, &channel_arc, *letter).await?;
    }
    if parsed.changes.is_empty() {
        return Ok(());
    }

    // Privilege gate: the strictest letter in the request decides.
    let actor_rank = {
        let channel = channel_arc.read().await;
        channel.member_modes(ctx.uid).rank()
    };
    let needed = parsed
        .changes
        .iter()
        .map(|c| required_rank(c.letter))
        .max()
        .unwrap_or(2);
    let permitted = ctx.handshake.is_oper || actor_rank >= needed.min(3) && actor_rank >= 2;
    let owner_needed = needed >= 5 && !ctx.handshake.is_oper && actor_rank < 5;
    if !permitted || owner_needed {
        return ctx
            .send(err_chanoprivsneeded(ctx.server_name(), &nick, name))
            .await;
    }

    let prefix = match user_prefix(ctx.network, ctx.uid).await {
        Some(prefix) => prefix,
        None => return Ok(()),
    };
    let applied = apply_changes(ctx.network, name, &parsed.changes, &nick).await;
    broadcast_applied(ctx.network, name, &applied, &prefix).await;
    Ok(())
}

/// Apply parsed changes to the channel, resolving member-mode nick
/// arguments and dropping no-ops. Returns the applied subset with
/// display arguments.
pub(crate) async fn apply_changes(
    network: &Arc<Network>,
    name: &str,
    changes: &[ModeChange],
    setter: &str,
) -> Vec<ModeChange> {
    let Some(channel_arc) = network.channels.get(name) else {
        return Vec::new();
    };
    let mut applied = Vec::new();

    for change in changes {
        let mut channel = channel_arc.write().await;
        match change.letter {
            'b' | 'e' | 'I' => {
                let mask = change.arg.clone().unwrap_or_default();
                let changed = match (change.letter, change.adding) {
                    ('b', true) => channel.add_ban(&mask, setter),
                    ('b', false) => channel.remove_ban(&mask),
                    ('e', true) => channel.add_ban_exception(&mask, setter),
                    ('e', false) => channel.remove_ban_exception(&mask),
                    ('I', true) => channel.add_invite_exception(&mask, setter),
                    ('I', false) => channel.remove_invite_exception(&mask),
                    _ => false,
                };
                if changed {
                    applied.push(change.clone());
                }
            }
            'k' => {
                if change.adding {
                    let key = change.arg.clone().unwrap_or_default();
                    if !key.is_empty() {
                        channel.modes.key = Some(key);
                        applied.push(change.clone());
                    }
                } else if channel.modes.key.take().is_some() {
                    applied.push(ModeChange {
                        adding: false,
                        letter: 'k',
                        arg: Some("*".to_string()),
                    });
                }
            }
            'l' => {
                if change.adding {
                    let limit: Option<u32> =
                        change.arg.as_deref().and_then(|a| a.parse().ok()).filter(|l| *l > 0);
                    if let Some(limit) = limit {
                        channel.modes.limit = Some(limit);
                        applied.push(ModeChange {
                            adding: true,
                            letter: 'l',
                            arg: Some(limit.to_string()),
                        });
                    }
                } else if channel.modes.limit.take().is_some() {
                    applied.push(ModeChange {
                        adding: false,
                        letter: 'l',
                        arg: None,
                    });
                }
            }
            letter if corvus_proto::ChannelModeSpec::is_member_mode(letter) => {
                let target_nick = change.arg.clone().unwrap_or_default();
                let Some(target_uid) = network.users.uid_of_nick(&target_nick) else {
                    continue;
                };
                if channel.set_member_mode(&target_uid, change.adding, letter) {
                    let letters = channel.member_modes(&target_uid).letters();
                    drop(channel);
                    if let Some(user) = network.users.get(&target_uid) {
                        let mut user = user.write().await;
                        let key = irc_to_lower(name);
                        user.channels.insert(key, letters);
                    }
                    applied.push(change.clone());
                    continue;
                }
            }
            letter => {
                if channel.modes.apply_flag(change.adding, letter) {
                    applied.push(change.clone());
                }
            }
        }
    }
    applied
}

/// One synthesized MODE line in canonical grouped form, to local channel
/// members only.
pub(crate) async fn broadcast_applied_local(
    network: &Arc<Network>,
    name: &str,
    applied: &[ModeChange],
    prefix: &Prefix,
) {
    if applied.is_empty() {
        return;
    }
    let (modes, args) = format_mode_changes(applied);
    let mut params = vec![name.to_string(), modes];
    params.extend(args);
    let mode_msg = Message::new("MODE", params).with_prefix(prefix.clone());
    network.send_to_channel(name, &mode_msg, None).await;
}

/// Local MODE line plus the TMODE flood to every link.
async fn broadcast_applied(
    network: &Arc<Network>,
    name: &str,
    applied: &[ModeChange],
    prefix: &Prefix,
) {
    if applied.is_empty() {
        return;
    }
    broadcast_applied_local(network, name, applied, prefix).await;

    let (modes, args) = format_mode_changes(applied);
    let channel_ts = match network.channels.get(name) {
        Some(channel) => channel.read().await.created_at,
        None => return,
    };
    let mut s2s_params = vec![channel_ts.to_string(), name.to_string(), modes];
    s2s_params.extend(args);
    let tmode = Message::new("TMODE", s2s_params)
        .with_prefix(Prefix::ServerName(network.info.sid.clone()));
    network.links.broadcast(&tmode, None).await;
}

/// Operator/service override path: no privilege checks, custom prefix.
pub async fn apply_channel_mode_override(
    network: &Arc<Network>,
    name: &str,
    modestr: &str,
    args: &[&str],
    prefix: &Prefix,
) -> Result<(), String> {
    if network.channels.get(name).is_none() {
        return Err(format!("Channel {} does not exist.", name));
    }
    let parsed = parse_channel_modes(modestr, args).map_err(|e| e.to_string())?;
    if !parsed.unknown.is_empty() {
        return Err(format!("Unknown mode characters: {:?}", parsed.unknown));
    }
    let applied = apply_changes(network, name, &parsed.changes, prefix.name()).await;
    broadcast_applied(network, name, &applied, prefix).await;
    Ok(())
}

async fn send_mode_list(
    ctx: &Context<'_>,
    channel_arc: &Arc<tokio::sync::RwLock<crate::state::Channel>>,
    letter: char,
) -> HandlerResult {
    let (channel_name, entries) = {
        let channel = channel_arc.read().await;
        let list = match letter {
            'b' => &channel.bans,
            'e' => &channel.ban_exceptions,
            'I' => &channel.invite_exceptions,
            _ => return Ok(()),
        };
        (channel.name.clone(), list.clone())
    };

    let (entry_reply, end_reply, end_text) = match letter {
        'b' => (
            Response::RPL_BANLIST,
            Response::RPL_ENDOFBANLIST,
            "End of channel ban list",
        ),
        'e' => (
            Response::RPL_EXCEPTLIST,
            Response::RPL_ENDOFEXCEPTLIST,
            "End of channel exception list",
        ),
        _ => (
            Response::RPL_INVITELIST,
            Response::RPL_ENDOFINVITELIST,
            "End of channel invite exception list",
        ),
    };

    for entry in entries {
        ctx.numeric(
            entry_reply,
            vec![
                channel_name.clone(),
                entry.mask,
                entry.set_by,
                entry.set_at.to_string(),
            ],
        )
        .await?;
    }
    ctx.numeric(end_reply, vec![channel_name, end_text.to_string()])
        .await
}

const KNOWN_USER_MODES: &str = "iwgBo";

async fn user_mode(ctx: &mut Context<'_>, target: &str, msg: &Message) -> HandlerResult {
    let nick = ctx.nick().to_string();
    if !corvus_proto::irc_eq(target, &nick) {
        return ctx
            .numeric(
                Response::ERR_USERSDONTMATCH,
                vec!["Cannot change mode for other users".to_string()],
            )
            .await;
    }

    let Some(user_arc) = ctx.network.users.get(ctx.uid) else {
        return Ok(());
    };

    // Query form.
    let Some(modestr) = msg.arg(1) else {
        let modes = user_arc.read().await.modes.as_mode_string();
        return ctx.numeric(Response::RPL_UMODEIS, vec![modes]).await;
    };

    let (changes, unknown) = parse_user_modes(modestr, KNOWN_USER_MODES);
    for _ in unknown {
        ctx.numeric(
            Response::ERR_UNKNOWNMODE,
            vec!["Unknown MODE flag".to_string()],
        )
        .await?;
    }

    let mut applied = String::new();
    {
        let mut user = user_arc.write().await;
        let mut direction: Option<bool> = None;
        for (adding, letter) in changes {
            let was_invisible = user.modes.invisible;
            let was_oper = user.modes.oper;
            if !user.modes.apply(adding, letter) {
                continue;
            }
            if user.modes.invisible != was_invisible {
                ctx.network.stats.set_invisible(user.modes.invisible);
            }
            if was_oper && !user.modes.oper {
                ctx.network.stats.deopered();
                ctx.handshake.is_oper = false;
                ctx.network.broker.set_oper(ctx.uid, false);
            }
            if direction != Some(adding) {
                applied.push(if adding { '+' } else { '-' });
                direction = Some(adding);
            }
            applied.push(letter);
        }
    }

    if !applied.is_empty() {
        let mode_msg = Message::new("MODE", vec![nick.clone(), applied])
            .with_prefix(Prefix::new(nick, String::new(), String::new()));
        ctx.send(mode_msg).await?;
    }
    Ok(())
}
