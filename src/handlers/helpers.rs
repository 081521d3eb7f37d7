//! Helper functions shared by command handlers.

use std::sync::Arc;

use corvus_proto::{Message, Prefix, Response};

use crate::state::Network;

/// Create a server numeric reply.
pub fn server_reply(server_name: &str, response: Response, params: Vec<String>) -> Message {
    Message::numeric(server_name, response, params)
}

/// Create a server NOTICE.
pub fn server_notice(server_name: &str, target: &str, text: impl Into<String>) -> Message {
    Message::notice(target, text.into()).with_prefix(Prefix::ServerName(server_name.to_string()))
}

/// Create an IRCv3 standard reply: `FAIL/WARN/NOTE <command> <code> <context…>`.
pub fn standard_reply(
    server_name: &str,
    kind: &str,
    command: &str,
    code: &str,
    description: &str,
) -> Message {
    Message::new(
        kind,
        vec![
            command.to_string(),
            code.to_string(),
            description.to_string(),
        ],
    )
    .with_prefix(Prefix::ServerName(server_name.to_string()))
}

/// The current time as an IRCv3 `time` tag value.
pub fn time_tag_now() -> String {
    corvus_proto::server_time_tag(chrono::Utc::now())
}

/// The full prefix of a user (`nick!ident@visible-host`), read under a
/// short lock.
pub async fn user_prefix(network: &Arc<Network>, uid: &str) -> Option<Prefix> {
    let user = network.users.get(uid)?;
    let user = user.read().await;
    Some(Prefix::new(
        user.nick.clone(),
        user.ident.clone(),
        user.visible_host.clone(),
    ))
}

/// ERR_NOSUCHNICK with the conventional text.
pub fn err_nosuchnick(server_name: &str, nick: &str, target: &str) -> Message {
    server_reply(
        server_name,
        Response::ERR_NOSUCHNICK,
        vec![
            nick.to_string(),
            target.to_string(),
            "No such nick/channel".to_string(),
        ],
    )
}

/// ERR_NOSUCHCHANNEL with the conventional text.
pub fn err_nosuchchannel(server_name: &str, nick: &str, channel: &str) -> Message {
    server_reply(
        server_name,
        Response::ERR_NOSUCHCHANNEL,
        vec![
            nick.to_string(),
            channel.to_string(),
            "No such channel".to_string(),
        ],
    )
}

/// ERR_NOTONCHANNEL with the conventional text.
pub fn err_notonchannel(server_name: &str, nick: &str, channel: &str) -> Message {
    server_reply(
        server_name,
        Response::ERR_NOTONCHANNEL,
        vec![
            nick.to_string(),
            channel.to_string(),
            "You're not on that channel".to_string(),
        ],
    )
}

/// ERR_CHANOPRIVSNEEDED with the conventional text.
pub fn err_chanoprivsneeded(server_name: &str, nick: &str, channel: &str) -> Message {
    server_reply(
        server_name,
        Response::ERR_CHANOPRIVSNEEDED,
        vec![
            nick.to_string(),
            channel.to_string(),
            "You're not channel operator".to_string(),
        ],
    )
}
