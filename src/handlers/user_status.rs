//! User status handlers: AWAY, SETNAME, ACCEPT.

use async_trait::async_trait;
use corvus_proto::{Message, Response, irc_to_lower};

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec, user_prefix};

static AWAY_SPEC: HandlerSpec = HandlerSpec::new("AWAY", 0);

/// Handler for AWAY.
pub struct AwayHandler;

#[async_trait]
impl Handler for AwayHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &AWAY_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let away = msg.arg(0).filter(|m| !m.is_empty()).map(|m| m.to_string());

        if let Some(user) = ctx.network.users.get(ctx.uid) {
            user.write().await.away = away.clone();
        }

        match &away {
            Some(_) => {
                ctx.numeric(
                    Response::RPL_NOWAWAY,
                    vec!["You have been marked as being away".to_string()],
                )
                .await?
            }
            None => {
                ctx.numeric(
                    Response::RPL_UNAWAY,
                    vec!["You are no longer marked as being away".to_string()],
                )
                .await?
            }
        }

        // away-notify observers.
        if let Some(prefix) = user_prefix(ctx.network, ctx.uid).await {
            let mut params = Vec::new();
            if let Some(away) = &away {
                params.push(away.clone());
            }
            let away_msg = Message::new("AWAY", params).with_prefix(prefix);
            for observer in ctx.network.common_channel_uids(ctx.uid).await {
                if ctx.network.broker.has_cap(&observer, "away-notify") {
                    ctx.network.broker.send_to_uid(&observer, &away_msg);
                }
            }
        }
        Ok(())
    }
}

static SETNAME_SPEC: HandlerSpec = HandlerSpec::new("SETNAME", 1);

/// Handler for SETNAME (IRCv3 realname change).
pub struct SetnameHandler;

#[async_trait]
impl Handler for SetnameHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &SETNAME_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let realname = msg.arg_or_empty(0).to_string();
        if realname.is_empty() {
            return ctx
                .send(super::standard_reply(
                    ctx.server_name(),
                    "FAIL",
                    "SETNAME",
                    "INVALID_REALNAME",
                    "Realname must not be empty",
                ))
                .await;
        }

        let prefix = match user_prefix(ctx.network, ctx.uid).await {
            Some(prefix) => prefix,
            None => return Ok(()),
        };
        if let Some(user) = ctx.network.users.get(ctx.uid) {
            user.write().await.realname = realname.clone();
        }
        ctx.handshake.realname = Some(realname.clone());

        let setname_msg = Message::new("SETNAME", vec![realname]).with_prefix(prefix);
        ctx.send(setname_msg.clone()).await?;
        for observer in ctx.network.common_channel_uids(ctx.uid).await {
            if ctx.network.broker.has_cap(&observer, "setname") {
                ctx.network.broker.send_to_uid(&observer, &setname_msg);
            }
        }
        Ok(())
    }
}

static ACCEPT_SPEC: HandlerSpec = HandlerSpec::new("ACCEPT", 1);

/// Handler for ACCEPT (caller-ID accept list).
///
/// `ACCEPT nick` adds, `ACCEPT -nick` removes, `ACCEPT *` lists.
pub struct AcceptHandler;

#[async_trait]
impl Handler for AcceptHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &ACCEPT_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let Some(user_arc) = ctx.network.users.get(ctx.uid) else {
            return Ok(());
        };

        for entry in msg.arg_or_empty(0).split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if entry == "*" {
                let list: Vec<String> = {
                    let user = user_arc.read().await;
                    user.accept_list.iter().cloned().collect()
                };
                let server_name = ctx.server_name().to_string();
                let nick = ctx.nick().to_string();
                ctx.send(super::server_notice(
                    &server_name,
                    &nick,
                    format!("Accept list: {}", list.join(" ")),
                ))
                .await?;
                continue;
            }
            if let Some(removed) = entry.strip_prefix('-') {
                user_arc
                    .write()
                    .await
                    .accept_list
                    .remove(&irc_to_lower(removed));
            } else {
                // Only online nicks can be accepted.
                if !ctx.network.users.nick_in_use(entry) {
                    ctx.send(super::err_nosuchnick(ctx.server_name(), ctx.nick(), entry))
                        .await?;
                    continue;
                }
                user_arc
                    .write()
                    .await
                    .accept_list
                    .insert(irc_to_lower(entry));
                // Let the sender know they got through.
                if let Some(target_uid) = ctx.network.users.uid_of_nick(entry) {
                    let notice = Message::numeric(
                        ctx.server_name(),
                        Response::RPL_TARGNOTIFY,
                        vec![
                            entry.to_string(),
                            ctx.nick().to_string(),
                            "has added you to their accept list".to_string(),
                        ],
                    );
                    ctx.network.broker.send_to_uid(&target_uid, &notice);
                }
            }
        }
        Ok(())
    }
}
