//! MONITOR handler (IRCv3 presence notifications).

use async_trait::async_trait;
use corvus_proto::{Message, Response};

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec};

static MONITOR_SPEC: HandlerSpec = HandlerSpec::new("MONITOR", 1);

/// Handler for MONITOR: `+ targets`, `- targets`, `C`, `L`, `S`.
pub struct MonitorHandler;

#[async_trait]
impl Handler for MonitorHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &MONITOR_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let action = msg.arg_or_empty(0).to_string();
        let targets: Vec<&str> = msg
            .arg_or_empty(1)
            .split(',')
            .filter(|t| !t.is_empty())
            .collect();

        match action.as_str() {
            "+" => {
                let result = ctx.network.monitors.add(ctx.uid, &targets);

                if !result.overflow.is_empty() {
                    ctx.numeric(
                        Response::ERR_MONLISTFULL,
                        vec![
                            ctx.network.limits.max_monitor_entries.to_string(),
                            result.overflow.join(","),
                            "Monitor list is full".to_string(),
                        ],
                    )
                    .await?;
                }

                // Immediate status for the accepted targets.
                let (online, offline): (Vec<&String>, Vec<&String>) = result
                    .added
                    .iter()
                    .partition(|t| ctx.network.users.nick_in_use(t));
                if !online.is_empty() {
                    let mut shown = Vec::new();
                    for nick in online {
                        if let Some(user) = ctx.network.users.by_nick(nick) {
                            let user = user.read().await;
                            shown.push(user.mask());
                        }
                    }
                    ctx.numeric(Response::RPL_MONONLINE, vec![shown.join(",")]).await?;
                }
                if !offline.is_empty() {
                    let shown: Vec<String> = offline.iter().map(|s| s.to_string()).collect();
                    ctx.numeric(Response::RPL_MONOFFLINE, vec![shown.join(",")]).await?;
                }
                Ok(())
            }
            "-" => {
                ctx.network.monitors.remove(ctx.uid, &targets);
                Ok(())
            }
            "C" => {
                ctx.network.monitors.clear(ctx.uid);
                Ok(())
            }
            "L" => {
                let list = ctx.network.monitors.list(ctx.uid);
                if !list.is_empty() {
                    ctx.numeric(Response::RPL_MONLIST, vec![list.join(",")]).await?;
                }
                ctx.numeric(
                    Response::RPL_ENDOFMONLIST,
                    vec!["End of MONITOR list".to_string()],
                )
                .await
            }
            "S" => {
                let list = ctx.network.monitors.list(ctx.uid);
                let (online, offline): (Vec<&String>, Vec<&String>) =
                    list.iter().partition(|t| ctx.network.users.nick_in_use(t));
                if !online.is_empty() {
                    let shown: Vec<String> = online.iter().map(|s| s.to_string()).collect();
                    ctx.numeric(Response::RPL_MONONLINE, vec![shown.join(",")]).await?;
                }
                if !offline.is_empty() {
                    let shown: Vec<String> = offline.iter().map(|s| s.to_string()).collect();
                    ctx.numeric(Response::RPL_MONOFFLINE, vec![shown.join(",")]).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
