//! CHATHISTORY handler, backed by the message repository.
//!
//! `CHATHISTORY <LATEST|BEFORE|AFTER|AROUND|BETWEEN> <target> <anchor…> [limit]`
//! with `timestamp=…` or `msgid=…` anchors, replied inside a batch when
//! the client negotiated one.

use async_trait::async_trait;
use corvus_proto::{Message, Prefix, irc_to_lower};

use crate::db::StoredMessage;
use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec, standard_reply};

static CHATHISTORY_SPEC: HandlerSpec = HandlerSpec::new("CHATHISTORY", 2);

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// Handler for CHATHISTORY.
pub struct ChathistoryHandler;

#[async_trait]
impl Handler for ChathistoryHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &CHATHISTORY_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let subcommand = msg.arg_or_empty(0).to_ascii_uppercase();
        let target = irc_to_lower(msg.arg_or_empty(1));
        let limit = msg
            .params
            .last()
            .and_then(|l| l.parse::<i64>().ok())
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT);

        let repo = ctx.network.db.messages();
        let result = match subcommand.as_str() {
            "LATEST" => repo.get_latest(&target, limit).await,
            "BEFORE" => match parse_timestamp_anchor(msg.arg_or_empty(2)) {
                Some(ts) => repo.get_before(&target, ts, limit).await,
                None => return invalid_params(ctx).await,
            },
            "AFTER" => match parse_timestamp_anchor(msg.arg_or_empty(2)) {
                Some(ts) => repo.get_after(&target, ts, limit).await,
                None => return invalid_params(ctx).await,
            },
            "AROUND" => match msg.arg_or_empty(2).strip_prefix("msgid=") {
                Some(msgid) => repo.get_around(&target, msgid, limit).await,
                None => return invalid_params(ctx).await,
            },
            "BETWEEN" => {
                let from = parse_timestamp_anchor(msg.arg_or_empty(2));
                let to = parse_timestamp_anchor(msg.arg_or_empty(3));
                match (from, to) {
                    (Some(from), Some(to)) => repo.get_between(&target, from, to, limit).await,
                    _ => return invalid_params(ctx).await,
                }
            }
            _ => {
                return ctx
                    .send(standard_reply(
                        ctx.server_name(),
                        "FAIL",
                        "CHATHISTORY",
                        "INVALID_PARAMS",
                        "Unknown CHATHISTORY subcommand",
                    ))
                    .await;
            }
        };

        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "CHATHISTORY repository error");
                return ctx
                    .send(standard_reply(
                        ctx.server_name(),
                        "FAIL",
                        "CHATHISTORY",
                        "MESSAGE_ERROR",
                        "Could not retrieve history, try again later",
                    ))
                    .await;
            }
        };

        replay(ctx, &target, messages).await
    }
}

fn parse_timestamp_anchor(arg: &str) -> Option<i64> {
    let value = arg.strip_prefix("timestamp=")?;
    if let Ok(unix) = value.parse::<i64>() {
        return Some(unix);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.timestamp())
}

async fn invalid_params(ctx: &Context<'_>) -> HandlerResult {
    ctx.send(standard_reply(
        ctx.server_name(),
        "FAIL",
        "CHATHISTORY",
        "INVALID_PARAMS",
        "Missing or malformed anchor",
    ))
    .await
}

async fn replay(ctx: &Context<'_>, target: &str, messages: Vec<StoredMessage>) -> HandlerResult {
    let batch = ctx.handshake.caps.has("batch");
    let batch_ref = format!("ch{}", chrono::Utc::now().timestamp_millis());

    if batch {
        ctx.send(
            Message::new(
                "BATCH",
                vec![
                    format!("+{}", batch_ref),
                    "chathistory".to_string(),
                    target.to_string(),
                ],
            )
            .with_prefix(ctx.network.server_prefix()),
        )
        .await?;
    }

    for stored in messages {
        let prefix = Prefix::parse(&stored.sender).unwrap_or_else(|_| {
            Prefix::new(stored.sender.clone(), String::new(), String::new())
        });
        let mut replayed = Message::new(
            stored.kind.clone(),
            vec![stored.target.clone(), stored.body.clone()],
        )
        .with_prefix(prefix)
        .with_tag("time", Some(corvus_proto::server_time_tag(
            chrono::DateTime::from_timestamp(stored.sent_at, 0).unwrap_or_default(),
        )))
        .with_tag("msgid", Some(stored.msgid.clone()));
        if let Some(account) = stored.account {
            replayed = replayed.with_tag("account", Some(account));
        }
        if batch {
            replayed = replayed.with_tag("batch", Some(batch_ref.clone()));
        }
        ctx.send(replayed).await?;
    }

    if batch {
        ctx.send(
            Message::new("BATCH", vec![format!("-{}", batch_ref)])
                .with_prefix(ctx.network.server_prefix()),
        )
        .await?;
    }
    Ok(())
}
