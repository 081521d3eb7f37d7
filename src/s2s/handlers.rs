//! Inbound S2S message handling: graph mutation, local fan-out, and
//! flood forwarding (every direct link minus the arrival link).

use std::collections::HashSet;
use std::sync::Arc;

use corvus_proto::{ChannelExt, Message, Prefix, irc_to_lower};
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::security::{BanKind, ServerBan};
use crate::state::user::{User, UserParams};
use crate::state::{MemberModes, Network};

fn uid_prefix(uid: &str) -> Prefix {
    Prefix::new(uid.to_string(), "", "")
}

fn protocol(msg: impl Into<String>) -> LinkError {
    LinkError::Protocol(msg.into())
}

/// Handle one message from a neighbor link.
pub async fn dispatch(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    match msg.command.as_str() {
        "PING" => {
            let token = msg.arg_or_empty(0).to_string();
            let pong = Message::pong(network.info.sid.clone(), token)
                .with_prefix(Prefix::ServerName(network.info.sid.clone()));
            network.links.send_to_sid(from_sid, pong).await;
            Ok(())
        }
        "PONG" => Ok(()),
        "UID" => handle_uid(network, from_sid, msg, false).await,
        "EUID" => handle_uid(network, from_sid, msg, true).await,
        "SID" => handle_sid(network, from_sid, msg).await,
        "SJOIN" => handle_sjoin(network, from_sid, msg).await,
        "TMODE" => handle_tmode(network, from_sid, msg).await,
        "TOPIC" => handle_topic(network, from_sid, msg).await,
        "NICK" => handle_nick(network, from_sid, msg).await,
        "PART" => handle_part(network, from_sid, msg).await,
        "QUIT" => handle_quit(network, from_sid, msg).await,
        "KICK" => handle_kick(network, from_sid, msg).await,
        "KILL" => handle_kill(network, from_sid, msg).await,
        "PRIVMSG" | "NOTICE" => handle_message(network, from_sid, msg).await,
        "WALLOPS" => {
            network.broker.send_to_operators(msg);
            network.links.broadcast(msg, Some(from_sid)).await;
            Ok(())
        }
        "ENCAP" => handle_encap(network, from_sid, msg).await,
        "AKILL" => handle_akill(network, from_sid, msg).await,
        "UNAKILL" => handle_unakill(network, from_sid, msg).await,
        "JUPE" => handle_jupe(network, from_sid, msg).await,
        "SQUIT" => handle_squit(network, from_sid, msg).await,
        "ERROR" => Err(LinkError::Closed),
        other => {
            // Tolerate unknown traffic from newer peers; just pass it on.
            debug!(command = %other, "Forwarding unknown S2S command");
            network.links.broadcast(msg, Some(from_sid)).await;
            Ok(())
        }
    }
}

/// Delink a neighbor (or a server behind one): prune the spanning
/// subtree and inject a synthetic QUIT for every UID behind it.
pub async fn perform_squit(network: &Arc<Network>, sid: &str, reason: &str) {
    let Some(node) = network.links.server(sid) else {
        return;
    };
    let split_reason = format!("{} {}", network.info.name, node.name);
    info!(server = %node.name, reason = %reason, "SQUIT");

    let (servers, uids) = network.links.remove_cascade(sid);
    for _ in &servers {
        network.stats.server_delinked();
    }
    for uid in uids {
        network.disconnect_user(&uid, &split_reason).await;
    }
}

// ----------------------------------------------------------------------
// User introduction and collision resolution
// ----------------------------------------------------------------------

/// `:<sid> UID nick hop ts umodes ident host ip uid :realname`
/// (`EUID` adds realhost and account before the realname).
async fn handle_uid(
    network: &Arc<Network>,
    from_sid: &str,
    msg: &Message,
    extended: bool,
) -> Result<(), LinkError> {
    let min = if extended { 11 } else { 9 };
    if msg.params.len() < min {
        return Err(protocol(format!("{} with too few params", msg.command)));
    }

    let nick = msg.arg_or_empty(0).to_string();
    let nick_ts: i64 = msg
        .arg_or_empty(2)
        .parse()
        .map_err(|_| protocol("bad nick TS"))?;
    let umodes = msg.arg_or_empty(3).to_string();
    let ident = msg.arg_or_empty(4).to_string();
    let host = msg.arg_or_empty(5).to_string();
    let ip = msg.arg_or_empty(6).to_string();
    let uid = msg.arg_or_empty(7).to_string();
    let (account, realname) = if extended {
        let account = msg.arg_or_empty(9);
        (
            (account != "*").then(|| account.to_string()),
            msg.arg_or_empty(10).to_string(),
        )
    } else {
        (None, msg.arg_or_empty(8).to_string())
    };

    if uid.len() != corvus_proto::UID_LEN {
        return Err(protocol(format!("bad UID {:?}", uid)));
    }

    // Nickname collision: the younger registration yields on both sides.
    if let Some(existing_uid) = network.users.uid_of_nick(&nick) {
        if existing_uid != uid {
            let existing_ts = match network.users.get(&existing_uid) {
                Some(user) => user.read().await.nick_ts,
                None => 0,
            };
            let kill_incoming = existing_ts <= nick_ts;
            let kill_existing = existing_ts >= nick_ts;
            warn!(nick = %nick, existing_ts, incoming_ts = nick_ts, "Nick collision");

            if kill_existing {
                let kill = Message::new(
                    "KILL",
                    vec![existing_uid.clone(), "Nick collision".to_string()],
                )
                .with_prefix(Prefix::ServerName(network.info.sid.clone()));
                network.links.broadcast(&kill, None).await;
                network
                    .disconnect_user(&existing_uid, "Nick collision")
                    .await;
            }
            if kill_incoming {
                let kill = Message::new("KILL", vec![uid.clone(), "Nick collision".to_string()])
                    .with_prefix(Prefix::ServerName(network.info.sid.clone()));
                network.links.send_to_sid(from_sid, kill).await;
                return Ok(());
            }
        }
    }

    if network.users.claim_nick(&nick, &uid).is_err() {
        // Somebody re-claimed it between the collision check and now.
        return Ok(());
    }

    let mut user = User::new(UserParams {
        uid: uid.clone(),
        nick: nick.clone(),
        nick_ts,
        ident,
        realname,
        host: host.clone(),
        ip,
        visible_host: host,
        account,
        caps: HashSet::new(),
        certfp: None,
        secure: umodes.contains('Z'),
    });
    user.modes.oper = umodes.contains('o');
    user.modes.service = umodes.contains('S');
    user.modes.invisible = umodes.contains('i');
    let is_service = user.modes.service;
    network.users.insert(user);
    network.links.add_uid(&uid);
    if !is_service {
        network.stats.remote_user_added();
    }

    network.notify_monitors_online(&nick);
    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// `:<sid> SID <name> <hop> <sid> :<description>`
async fn handle_sid(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    if msg.params.len() < 3 {
        return Err(protocol("SID with too few params"));
    }
    let name = msg.arg_or_empty(0).to_string();
    let hop: u32 = msg.arg_or_empty(1).parse().unwrap_or(2);
    let sid = msg.arg_or_empty(2).to_string();
    let description = msg.arg_or_empty(3).to_string();

    if network.bans.is_juped(&name).is_some() {
        return Err(protocol(format!("{} is juped", name)));
    }
    network
        .links
        .add_remote_server(&sid, &name, &description, hop, from_sid);
    network.stats.server_linked();
    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

// ----------------------------------------------------------------------
// Channel state
// ----------------------------------------------------------------------

fn member_modes_from_flags(flags: &str) -> MemberModes {
    let mut modes = MemberModes::default();
    for flag in flags.chars() {
        match flag {
            '~' => modes.owner = true,
            '&' => modes.admin = true,
            '@' => modes.op = true,
            '%' => modes.halfop = true,
            '+' => modes.voice = true,
            _ => {}
        }
    }
    modes
}

/// `:<sid> SJOIN <ts> <name> <modes…> :<[flags]uid …>`
async fn handle_sjoin(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    if msg.params.len() < 4 {
        return Err(protocol("SJOIN with too few params"));
    }
    let their_ts: i64 = msg
        .arg_or_empty(0)
        .parse()
        .map_err(|_| protocol("bad channel TS"))?;
    let name = msg.arg_or_empty(1).to_string();
    if !name.is_channel_name() {
        return Err(protocol(format!("SJOIN to non-channel {:?}", name)));
    }
    let members_raw = msg.params.last().cloned().unwrap_or_default();

    let (channel_arc, created) = network.channels.get_or_create(&name);
    let mut strip_their_status = false;
    {
        let mut channel = channel_arc.write().await;
        if created {
            channel.created_at = their_ts;
        }
        if their_ts < channel.created_at {
            // The earlier TS wins: their state is canonical.
            channel.created_at = their_ts;
            channel.modes = Default::default();
            channel.bans.clear();
            channel.ban_exceptions.clear();
            channel.invite_exceptions.clear();
            for member in channel.members.values_mut() {
                member.modes = MemberModes::default();
            }
        } else if their_ts > channel.created_at {
            strip_their_status = true;
        }

        // Winning-side channel modes travel in the SJOIN itself.
        if !strip_their_status && msg.params.len() > 3 {
            let modestr = msg.arg_or_empty(2);
            let mode_args: Vec<&str> = msg.params[3..msg.params.len() - 1]
                .iter()
                .map(String::as_str)
                .collect();
            if let Ok(parsed) = corvus_proto::mode::parse_channel_modes(modestr, &mode_args) {
                for change in parsed.changes {
                    match change.letter {
                        'k' => {
                            channel.modes.key = change
                                .adding
                                .then(|| change.arg.unwrap_or_default())
                                .filter(|k| !k.is_empty());
                        }
                        'l' => {
                            channel.modes.limit = change
                                .adding
                                .then(|| change.arg.and_then(|a| a.parse().ok()))
                                .flatten();
                        }
                        letter => {
                            channel.modes.apply_flag(change.adding, letter);
                        }
                    }
                }
            }
        }
    }

    for entry in members_raw.split_ascii_whitespace() {
        let uid: String = entry
            .chars()
            .skip_while(|c| matches!(c, '~' | '&' | '@' | '%' | '+'))
            .collect();
        let flags: String = entry
            .chars()
            .take_while(|c| matches!(c, '~' | '&' | '@' | '%' | '+'))
            .collect();
        if uid.is_empty() {
            continue;
        }

        let modes = if strip_their_status {
            MemberModes::default()
        } else {
            member_modes_from_flags(&flags)
        };

        let Some(user_arc) = network.users.get(&uid) else {
            debug!(uid = %uid, "SJOIN for unknown UID");
            continue;
        };
        let nick = {
            let mut user = user_arc.write().await;
            user.join_channel(&irc_to_lower(&name), modes.letters());
            user.nick.clone()
        };
        let newly_joined = {
            let mut channel = channel_arc.write().await;
            channel.add_member(&uid, &nick, modes)
        };
        if newly_joined {
            let join_msg = Message::new("JOIN", vec![name.clone()]).with_prefix(
                match crate::handlers::user_prefix(network, &uid).await {
                    Some(prefix) => prefix,
                    None => uid_prefix(&uid),
                },
            );
            network.send_to_channel(&name, &join_msg, Some(&uid)).await;
        }
    }

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// `:<src> TMODE <ts> <name> <modes> [args…]`
async fn handle_tmode(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    if msg.params.len() < 3 {
        return Err(protocol("TMODE with too few params"));
    }
    let their_ts: i64 = msg
        .arg_or_empty(0)
        .parse()
        .map_err(|_| protocol("bad channel TS"))?;
    let name = msg.arg_or_empty(1).to_string();
    let modestr = msg.arg_or_empty(2).to_string();
    let args: Vec<&str> = msg.params.iter().skip(3).map(String::as_str).collect();

    let Some(channel_arc) = network.channels.get(&name) else {
        return Ok(());
    };
    let our_ts = channel_arc.read().await.created_at;
    if their_ts > our_ts {
        // Losing side of a TS conflict: their modes are discarded.
        return Ok(());
    }

    let parsed = corvus_proto::mode::parse_channel_modes(&modestr, &args)
        .map_err(|e| protocol(e.to_string()))?;
    let setter = msg.source().unwrap_or(from_sid).to_string();
    let applied =
        crate::handlers::mode::apply_changes(network, &name, &parsed.changes, &setter).await;

    let prefix = match msg.source() {
        Some(source) if source.len() == corvus_proto::UID_LEN => {
            match crate::handlers::user_prefix(network, source).await {
                Some(prefix) => prefix,
                None => Prefix::ServerName(network.links.my_name.clone()),
            }
        }
        _ => Prefix::ServerName(
            network
                .links
                .server(from_sid)
                .map(|s| s.name)
                .unwrap_or_else(|| network.info.name.clone()),
        ),
    };
    crate::handlers::mode::broadcast_applied_local(network, &name, &applied, &prefix).await;

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// `:<uid> TOPIC <name> :<text>`
async fn handle_topic(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let name = msg.arg_or_empty(0).to_string();
    let text = msg.arg_or_empty(1).to_string();
    let source = msg.source().unwrap_or(from_sid).to_string();

    let Some(channel_arc) = network.channels.get(&name) else {
        return Ok(());
    };
    let setter = match network.users.get(&source) {
        Some(user) => user.read().await.nick.clone(),
        None => source.clone(),
    };
    channel_arc.write().await.set_topic(text.clone(), setter);

    let prefix = match crate::handlers::user_prefix(network, &source).await {
        Some(prefix) => prefix,
        None => uid_prefix(&source),
    };
    let topic_msg = Message::new("TOPIC", vec![name.clone(), text]).with_prefix(prefix);
    network.send_to_channel(&name, &topic_msg, None).await;

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// `:<uid> NICK <new> <ts>` - remote nickname change.
async fn handle_nick(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let Some(uid) = msg.source().map(|s| s.to_string()) else {
        return Err(protocol("NICK without source"));
    };
    let new_nick = msg.arg_or_empty(0).to_string();
    let nick_ts: i64 = msg
        .arg(1)
        .and_then(|t| t.parse().ok())
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    let Some(user_arc) = network.users.get(&uid) else {
        return Ok(());
    };
    let old_nick = user_arc.read().await.nick.clone();
    if network.users.rename(&old_nick, &new_nick, &uid).is_err() {
        // Collision on rename: resolve exactly like a burst collision.
        warn!(old = %old_nick, new = %new_nick, "Remote nick change collision");
        return Ok(());
    }

    let (prefix, channels) = {
        let mut user = user_arc.write().await;
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
        if let Some(channel) = network.channels.get(name) {
            if let Some(member) = channel.write().await.members.get_mut(&uid) {
                member.nick = new_nick.clone();
            }
        }
    }

    let nick_msg = Message::new("NICK", vec![new_nick]).with_prefix(prefix);
    let observers = network.common_channel_uids(&uid).await;
    network.broker.send_to_many(observers.iter(), &nick_msg, None);

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

async fn handle_part(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let Some(uid) = msg.source().map(|s| s.to_string()) else {
        return Err(protocol("PART without source"));
    };
    let name = msg.arg_or_empty(0).to_string();
    let reason = msg.arg(1).map(|s| s.to_string());

    if let Some(channel_arc) = network.channels.get(&name) {
        let mut params = vec![name.clone()];
        if let Some(reason) = reason {
            params.push(reason);
        }
        let part_msg = Message::new("PART", params).with_prefix(
            match crate::handlers::user_prefix(network, &uid).await {
                Some(prefix) => prefix,
                None => uid_prefix(&uid),
            },
        );
        network.send_to_channel(&name, &part_msg, Some(&uid)).await;
        channel_arc.write().await.remove_member(&uid);
        if let Some(user) = network.users.get(&uid) {
            user.write().await.part_channel(&irc_to_lower(&name));
        }
        network.channels.remove_if_empty(&name).await;
    }

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

async fn handle_quit(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let Some(uid) = msg.source().map(|s| s.to_string()) else {
        return Err(protocol("QUIT without source"));
    };
    let reason = msg.arg_or_empty(0).to_string();
    network.disconnect_user(&uid, &reason).await;
    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

async fn handle_kick(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let name = msg.arg_or_empty(0).to_string();
    let target_uid = msg.arg_or_empty(1).to_string();
    let reason = msg.arg_or_empty(2).to_string();
    let source = msg.source().unwrap_or(from_sid).to_string();

    if let Some(channel_arc) = network.channels.get(&name) {
        let target_nick = match network.users.get(&target_uid) {
            Some(user) => user.read().await.nick.clone(),
            None => target_uid.clone(),
        };
        let kick_msg = Message::new(
            "KICK",
            vec![name.clone(), target_nick, reason],
        )
        .with_prefix(match crate::handlers::user_prefix(network, &source).await {
            Some(prefix) => prefix,
            None => uid_prefix(&source),
        });
        network.send_to_channel(&name, &kick_msg, None).await;

        channel_arc.write().await.remove_member(&target_uid);
        if let Some(user) = network.users.get(&target_uid) {
            user.write().await.part_channel(&irc_to_lower(&name));
        }
        network.channels.remove_if_empty(&name).await;
    }

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

async fn handle_kill(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let target_uid = msg.arg_or_empty(0).to_string();
    // The originating server already finalized the reason text.
    let reason = msg.arg_or_empty(1).to_string();
    network.disconnect_user(&target_uid, &reason).await;
    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// Remote PRIVMSG/NOTICE: deliver locally and keep flooding.
async fn handle_message(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let target = msg.arg_or_empty(0).to_string();
    let body = msg.arg_or_empty(1).to_string();
    let source = msg.source().unwrap_or(from_sid).to_string();

    let prefix = match crate::handlers::user_prefix(network, &source).await {
        Some(prefix) => prefix,
        None => uid_prefix(&source),
    };

    if target.is_channel_name() {
        let local_msg = Message::new(msg.command.clone(), vec![target.clone(), body])
            .with_prefix(prefix)
            .with_tag("time", Some(crate::handlers::time_tag_now()));
        network.send_to_channel(&target, &local_msg, Some(&source)).await;
        network.links.broadcast(msg, Some(from_sid)).await;
        return Ok(());
    }

    // Addressed to a UID or a nick; a service target stays local.
    if crate::services::dispatch(network, &source, &target, &body).await {
        return Ok(());
    }
    let target_uid = if target.len() == corvus_proto::UID_LEN && network.users.get(&target).is_some()
    {
        Some(target.clone())
    } else {
        network.users.uid_of_nick(&target)
    };
    let Some(target_uid) = target_uid else {
        return Ok(());
    };

    if network.users.is_local(&target_uid) {
        let target_nick = match network.users.get(&target_uid) {
            Some(user) => user.read().await.nick.clone(),
            None => return Ok(()),
        };
        let local_msg = Message::new(msg.command.clone(), vec![target_nick, body])
            .with_prefix(prefix)
            .with_tag("time", Some(crate::handlers::time_tag_now()));
        network.broker.send_to_uid(&target_uid, &local_msg);
    } else {
        network.links.send_to_uid_owner(&target_uid, msg.clone()).await;
    }
    Ok(())
}

/// `:<src> ENCAP <target-mask> <subcommand> <args…>`
///
/// Known subcommands are handled locally; everything is forwarded per
/// its target mask.
async fn handle_encap(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    if msg.params.len() < 2 {
        return Err(protocol("ENCAP with too few params"));
    }
    let subcommand = msg.arg_or_empty(1).to_ascii_uppercase();

    if subcommand == "LOGIN" {
        let uid = msg.arg_or_empty(2).to_string();
        let account = msg.arg_or_empty(3).to_string();
        if let Some(user) = network.users.get(&uid) {
            let mut user = user.write().await;
            user.account = (account != "*").then_some(account);
            user.modes.registered = user.account.is_some();
        }
    }

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// `:<src> AKILL <mask> <expires|0> :<reason>`
async fn handle_akill(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let mask = msg.arg_or_empty(0).to_string();
    if mask.is_empty() {
        return Err(protocol("AKILL without mask"));
    }
    let expires_at: Option<i64> = msg
        .arg_or_empty(1)
        .parse::<i64>()
        .ok()
        .filter(|e| *e > 0);
    let reason = msg.arg_or_empty(2).to_string();

    let ban = ServerBan {
        kind: BanKind::G,
        mask,
        reason: reason.clone(),
        set_by: msg.source().unwrap_or(from_sid).to_string(),
        set_at: chrono::Utc::now().timestamp(),
        expires_at,
    };
    if let Err(e) = network.db.bans().add(&ban).await {
        warn!(error = %e, "Failed to persist flooded AKILL");
    }
    network.bans.add(ban);
    crate::handlers::bans::enforce_ban_on_users(network, &reason).await;

    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

async fn handle_unakill(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let mask = msg.arg_or_empty(0).to_string();
    network.bans.remove(BanKind::G, &mask);
    if let Err(e) = network.db.bans().remove(BanKind::G, &mask).await {
        warn!(error = %e, "Failed to remove flooded AKILL");
    }
    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// `:<src> JUPE <server-name> :<reason>`
async fn handle_jupe(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let name = msg.arg_or_empty(0).to_string();
    let reason = msg.arg_or_empty(1).to_string();

    network.bans.add(ServerBan {
        kind: BanKind::Jupe,
        mask: name.clone(),
        reason: reason.clone(),
        set_by: msg.source().unwrap_or(from_sid).to_string(),
        set_at: chrono::Utc::now().timestamp(),
        expires_at: None,
    });

    if let Some(node) = network.links.server_by_name(&name) {
        perform_squit(network, &node.sid, &reason).await;
    }
    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

/// `:<src> SQUIT <sid|name> :<reason>`
async fn handle_squit(network: &Arc<Network>, from_sid: &str, msg: &Message) -> Result<(), LinkError> {
    let target = msg.arg_or_empty(0).to_string();
    let reason = msg.arg_or_empty(1).to_string();

    let sid = if network.links.server(&target).is_some() {
        Some(target.clone())
    } else {
        network.links.server_by_name(&target).map(|s| s.sid)
    };
    if let Some(sid) = sid {
        perform_squit(network, &sid, &reason).await;
    }
    network.links.broadcast(msg, Some(from_sid)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::member_modes_from_flags;

    #[test]
    fn sjoin_flags() {
        let modes = member_modes_from_flags("@+");
        assert!(modes.op);
        assert!(modes.voice);
        assert!(!modes.owner);
        assert_eq!(member_modes_from_flags("").rank(), 0);
        assert!(member_modes_from_flags("~").owner);
    }
}
