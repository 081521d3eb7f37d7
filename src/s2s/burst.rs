//! Link-up burst: introduce our view of the network to a new neighbor.

use std::sync::Arc;

use corvus_proto::{Message, Prefix};
use tokio::sync::mpsc;
use tracing::debug;

use crate::security::BanKind;
use crate::state::Network;

/// Send the full state burst down a freshly linked peer.
///
/// Order: service pseudo-users, every known user (UID), every channel
/// (SJOIN), network-wide bans (AKILL), then an end-of-burst PING.
pub async fn send_burst(network: &Arc<Network>, tx: &mpsc::Sender<Message>) {
    let my_sid = network.info.sid.clone();

    // Service pseudo-users carry +S and our SID.
    for service in network.services.all() {
        let uid = network.services.uid_of(service.as_ref());
        let msg = Message::new(
            "UID",
            vec![
                service.nickname().to_string(),
                "1".to_string(),
                network.info.created_at.to_string(),
                "+S".to_string(),
                service.ident().to_string(),
                network.info.name.clone(),
                "0".to_string(),
                uid,
                service.realname().to_string(),
            ],
        )
        .with_prefix(Prefix::ServerName(my_sid.clone()));
        let _ = tx.send(msg).await;
    }

    // Every user we know about, prefixed by its owning SID.
    for uid in network.users.all_uids() {
        let Some(user) = network.users.get(&uid) else {
            continue;
        };
        let user = user.read().await;
        if user.modes.service {
            continue;
        }
        let owner_sid = uid.get(0..3).unwrap_or(&my_sid).to_string();
        let msg = Message::new(
            "UID",
            vec![
                user.nick.clone(),
                "1".to_string(),
                user.nick_ts.to_string(),
                user.modes.as_mode_string(),
                user.ident.clone(),
                user.visible_host.clone(),
                user.ip.clone(),
                uid.clone(),
                user.realname.clone(),
            ],
        )
        .with_prefix(Prefix::ServerName(owner_sid));
        let _ = tx.send(msg).await;
    }

    // Channel state: TS, flag modes, and prefixed member list.
    for name in network.channels.names() {
        let Some(channel_arc) = network.channels.get(&name) else {
            continue;
        };
        let channel = channel_arc.read().await;
        let (mode_string, mode_args) = channel.modes.as_mode_string(true);

        let members: Vec<String> = channel
            .members
            .values()
            .map(|m| format!("{}{}", m.modes.prefixes(true), m.uid))
            .collect();
        if members.is_empty() {
            continue;
        }

        let mut params = vec![
            channel.created_at.to_string(),
            channel.name.clone(),
            mode_string,
        ];
        params.extend(mode_args);
        params.push(members.join(" "));
        let msg =
            Message::new("SJOIN", params).with_prefix(Prefix::ServerName(my_sid.clone()));
        let _ = tx.send(msg).await;
    }

    // Network-wide bans.
    for ban in network.bans.list(BanKind::G) {
        let msg = Message::new(
            "AKILL",
            vec![
                ban.mask,
                ban.expires_at
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "0".to_string()),
                ban.reason,
            ],
        )
        .with_prefix(Prefix::ServerName(my_sid.clone()));
        let _ = tx.send(msg).await;
    }

    let _ = tx
        .send(
            Message::ping(my_sid.clone()).with_prefix(Prefix::ServerName(my_sid.clone())),
        )
        .await;
    debug!("Burst sent");
}
