//! MemoServ - offline messages between registered accounts.

use async_trait::async_trait;

use crate::services::{Service, ServiceContext, ServiceResult, refuse, rest};

pub struct MemoServ;

#[async_trait]
impl Service for MemoServ {
    fn nickname(&self) -> &'static str {
        "MemoServ"
    }

    fn realname(&self) -> &'static str {
        "Memo service"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["MS"]
    }

    fn uid_suffix(&self) -> char {
        'D'
    }

    fn help(&self, command: Option<&str>) -> Vec<String> {
        match command.map(|c| c.to_ascii_uppercase()) {
            Some(cmd) if cmd == "SEND" => vec![
                "SEND <nick> <text>".to_string(),
                "Sends a memo to a registered nickname.".to_string(),
            ],
            _ => vec![
                "MemoServ commands:".to_string(),
                "  SEND <nick> <text>".to_string(),
                "  LIST".to_string(),
                "  READ <number>".to_string(),
                "  DEL <number>".to_string(),
                "  CLEAR".to_string(),
            ],
        }
    }

    async fn handle(
        &self,
        ctx: &ServiceContext<'_>,
        command: &str,
        args: &[&str],
    ) -> ServiceResult {
        match command {
            "SEND" => send(ctx, args).await,
            "LIST" => list(ctx).await,
            "READ" => read(ctx, args).await,
            "DEL" => del(ctx, args).await,
            "CLEAR" => clear(ctx).await,
            _ => Err(refuse(format!(
                "Unknown command: \x02{}\x02. Use \x02HELP\x02 for a list of commands.",
                command
            ))),
        }
    }
}

async fn send(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    // Sender must be identified.
    ctx.require_account_id().await?;

    let Some(recipient) = args.first() else {
        return Err(refuse("Syntax: SEND <nick> <text>"));
    };
    let body = rest(args, 1);
    if body.is_empty() {
        return Err(refuse("Syntax: SEND <nick> <text>"));
    }
    if recipient.eq_ignore_ascii_case(&ctx.source_nick) {
        return Err(refuse("You cannot send a memo to yourself."));
    }

    let Some(account) = ctx.network.db.accounts().find_by_name(recipient).await? else {
        return Err(refuse(format!(
            "Nickname \x02{}\x02 is not registered.",
            recipient
        )));
    };

    ctx.network
        .db
        .memos()
        .send(account.id, &ctx.source_nick, &body)
        .await?;
    ctx.reply(format!("Memo sent to {}.", recipient));

    // Nudge the recipient if they are online and identified.
    if let Some(target) = ctx.network.users.by_nick(recipient) {
        let target = target.read().await;
        if target.account.as_deref() == Some(account.name.as_str()) {
            let notice = corvus_proto::Message::notice(
                target.nick.clone(),
                format!(
                    "You have a new memo from {}. Use \x02/msg MemoServ LIST\x02 to read it.",
                    ctx.source_nick
                ),
            )
            .with_prefix(corvus_proto::Prefix::new(
                "MemoServ",
                "services",
                ctx.network.info.name.clone(),
            ));
            ctx.network.broker.send_to_uid(&target.uid, &notice);
        }
    }
    Ok(())
}

async fn list(ctx: &ServiceContext<'_>) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let memos = ctx.network.db.memos().list_for(account_id).await?;
    if memos.is_empty() {
        ctx.reply("You have no memos.");
        return Ok(());
    }
    ctx.reply(format!("You have {} memo(s):", memos.len()));
    for (i, memo) in memos.iter().enumerate() {
        let flag = if memo.unread { "[NEW] " } else { "" };
        let when = chrono::DateTime::from_timestamp(memo.sent_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        ctx.reply(format!("  {}: {}from {} ({})", i + 1, flag, memo.sender, when));
    }
    Ok(())
}

/// Resolve a 1-based list index to the memo at that position.
async fn memo_at(
    ctx: &ServiceContext<'_>,
    account_id: i64,
    args: &[&str],
) -> Result<crate::db::Memo, crate::services::ServiceError> {
    let index: usize = args
        .first()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| refuse("Syntax: READ/DEL <number>"))?;
    let memos = ctx.network.db.memos().list_for(account_id).await?;
    memos
        .get(index.wrapping_sub(1))
        .cloned()
        .ok_or_else(|| refuse(format!("No memo number {}.", index)))
}

async fn read(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let memo = memo_at(ctx, account_id, args).await?;
    let when = chrono::DateTime::from_timestamp(memo.sent_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    ctx.reply(format!("Memo from {} ({}):", memo.sender, when));
    ctx.reply(format!("  {}", memo.body));
    ctx.network.db.memos().mark_read(memo.id).await?;
    Ok(())
}

async fn del(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let memo = memo_at(ctx, account_id, args).await?;
    ctx.network.db.memos().delete(memo.id).await?;
    ctx.reply("Memo deleted.");
    Ok(())
}

async fn clear(ctx: &ServiceContext<'_>) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let removed = ctx.network.db.memos().clear_for(account_id).await?;
    ctx.reply(format!("{} memo(s) deleted.", removed));
    Ok(())
}
