//! Account state propagation: `account-notify` fan-out and S2S login
//! announcements.

use std::sync::Arc;

use corvus_proto::{Message, Prefix};

use crate::state::Network;

/// Announce a login (or logout, with `None`) for a user: ACCOUNT to
/// capable observers and ENCAP LOGIN across the network.
pub async fn broadcast_login(network: &Arc<Network>, uid: &str, account: Option<&str>) {
    let Some(user) = network.users.get(uid) else {
        return;
    };
    let prefix = {
        let user = user.read().await;
        Prefix::new(
            user.nick.clone(),
            user.ident.clone(),
            user.visible_host.clone(),
        )
    };

    let account_arg = account.unwrap_or("*").to_string();
    let account_msg = Message::new("ACCOUNT", vec![account_arg.clone()]).with_prefix(prefix);

    // account-notify observers share a channel with the user.
    for observer in network.common_channel_uids(uid).await {
        if let Some(other) = network.users.get(&observer) {
            if other.read().await.caps.contains("account-notify") {
                network.broker.send_to_uid(&observer, &account_msg);
            }
        }
    }

    let encap = Message::new(
        "ENCAP",
        vec![
            "*".to_string(),
            "LOGIN".to_string(),
            uid.to_string(),
            account_arg,
        ],
    )
    .with_prefix(Prefix::ServerName(network.info.sid.clone()));
    network.links.broadcast(&encap, None).await;
}
