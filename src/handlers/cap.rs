//! CAP command handler for IRCv3 capability negotiation.
//!
//! Implements CAP LS, LIST, REQ, END. While negotiation is open,
//! registration completion is blocked.

use async_trait::async_trait;
use corvus_proto::caps::{CapReqOutcome, ls_body};
use corvus_proto::{Message, Prefix};
use tracing::debug;

use crate::error::HandlerResult;
use crate::handlers::connection::try_complete_registration;
use crate::handlers::{Context, Handler, HandlerSpec};

static CAP_SPEC: HandlerSpec = HandlerSpec::new("CAP", 1).pre_registration();

/// Handler for CAP.
pub struct CapHandler;

#[async_trait]
impl Handler for CapHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &CAP_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let subcommand = msg.arg_or_empty(0).to_ascii_uppercase();
        match subcommand.as_str() {
            "LS" => handle_ls(ctx, msg.arg(1)).await,
            "LIST" => handle_list(ctx).await,
            "REQ" => handle_req(ctx, msg.arg_or_empty(1)).await,
            "END" => handle_end(ctx).await,
            other => {
                // ACK/NAK/NEW/DEL are server-to-client only.
                debug!(subcommand = %other, "Ignoring client CAP subcommand");
                Ok(())
            }
        }
    }
}

fn cap_reply(ctx: &Context<'_>, params: Vec<String>) -> Message {
    let mut full = vec![ctx.nick().to_string()];
    full.extend(params);
    Message::new("CAP", full).with_prefix(Prefix::ServerName(ctx.server_name().to_string()))
}

async fn handle_ls(ctx: &mut Context<'_>, version: Option<&str>) -> HandlerResult {
    let version: u32 = version.and_then(|v| v.parse().ok()).unwrap_or(301);
    if !ctx.handshake.is_registered() {
        ctx.handshake.caps.negotiating = true;
    }
    ctx.handshake.caps.version = ctx.handshake.caps.version.max(version);

    let body = ls_body(&ctx.network.advertised_caps, ctx.handshake.caps.version);
    let reply = cap_reply(ctx, vec!["LS".to_string(), body]);
    ctx.send(reply).await
}

async fn handle_list(ctx: &mut Context<'_>) -> HandlerResult {
    let body = ctx.handshake.caps.enabled().join(" ");
    let reply = cap_reply(ctx, vec!["LIST".to_string(), body]);
    ctx.send(reply).await
}

async fn handle_req(ctx: &mut Context<'_>, request: &str) -> HandlerResult {
    if !ctx.handshake.is_registered() {
        ctx.handshake.caps.negotiating = true;
    }

    let advertised = ctx.network.advertised_cap_names();
    let outcome = ctx.handshake.caps.request(&advertised, request);
    let verb = match outcome {
        CapReqOutcome::Ack => "ACK",
        CapReqOutcome::Nak => "NAK",
    };
    let reply = cap_reply(ctx, vec![verb.to_string(), request.to_string()]);
    ctx.send(reply).await?;

    // A post-registration REQ retunes the broker's tag tailoring.
    if ctx.handshake.is_registered() {
        ctx.network
            .broker
            .update_caps(ctx.uid, ctx.handshake.cap_names());
        if let Some(user) = ctx.network.users.get(ctx.uid) {
            user.write().await.caps = ctx.handshake.cap_names();
        }
    }
    Ok(())
}

async fn handle_end(ctx: &mut Context<'_>) -> HandlerResult {
    ctx.handshake.caps.negotiating = false;
    try_complete_registration(ctx).await
}
