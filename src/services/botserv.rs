//! BotServ - channel bot assignment and puppeteering.

use async_trait::async_trait;
use corvus_proto::{ChannelExt, Message, Prefix};

use crate::services::{Service, ServiceContext, ServiceResult, refuse, rest};

pub struct BotServ;

#[async_trait]
impl Service for BotServ {
    fn nickname(&self) -> &'static str {
        "BotServ"
    }

    fn realname(&self) -> &'static str {
        "Bot service"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["BS"]
    }

    fn uid_suffix(&self) -> char {
        'F'
    }

    fn help(&self, command: Option<&str>) -> Vec<String> {
        match command.map(|c| c.to_ascii_uppercase()) {
            Some(cmd) if cmd == "SET" => vec![
                "SET <#channel> GREET {ON|OFF}".to_string(),
                "SET <#channel> GREETMSG <text>".to_string(),
            ],
            _ => vec![
                "BotServ commands:".to_string(),
                "  BOTLIST".to_string(),
                "  ASSIGN <#channel> <bot>".to_string(),
                "  UNASSIGN <#channel>".to_string(),
                "  SAY <#channel> <text>".to_string(),
                "  ACT <#channel> <text>".to_string(),
                "  INFO <#channel>".to_string(),
                "  SET <#channel> {GREET|GREETMSG} <value>".to_string(),
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
            "BOTLIST" => botlist(ctx).await,
            "ASSIGN" => assign(ctx, args).await,
            "UNASSIGN" => unassign(ctx, args).await,
            "SAY" => puppet(ctx, args, false).await,
            "ACT" => puppet(ctx, args, true).await,
            "INFO" => info(ctx, args).await,
            "SET" => set(ctx, args).await,
            _ => Err(refuse(format!(
                "Unknown command: \x02{}\x02. Use \x02HELP\x02 for a list of commands.",
                command
            ))),
        }
    }
}

fn channel_arg<'x>(args: &[&'x str]) -> Result<&'x str, crate::services::ServiceError> {
    match args.first() {
        Some(name) if name.is_channel_name() => Ok(name),
        _ => Err(refuse("Syntax: <command> <#channel> ...")),
    }
}

/// Channel founder (or operator) gate, reusing the ChanServ binding.
async fn require_access(ctx: &ServiceContext<'_>, name: &str) -> ServiceResult {
    let Some(registration) = ctx.network.db.channels().find_by_name(name).await? else {
        return Err(refuse(format!("Channel \x02{}\x02 is not registered.", name)));
    };
    if ctx.is_operator {
        return Ok(());
    }
    let account_id = ctx.require_account_id().await?;
    if registration.founder_account_id != account_id {
        return Err(refuse("Access denied."));
    }
    Ok(())
}

async fn botlist(ctx: &ServiceContext<'_>) -> ServiceResult {
    let bots = ctx.network.db.bots().all().await?;
    if bots.is_empty() {
        ctx.reply("No bots are available.");
        return Ok(());
    }
    ctx.reply("Available bots:");
    for bot in bots {
        ctx.reply(format!("  {} ({}@{}) - {}", bot.nick, bot.ident, bot.host, bot.realname));
    }
    Ok(())
}

async fn assign(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    require_access(ctx, name).await?;
    let Some(bot_nick) = args.get(1) else {
        return Err(refuse("Syntax: ASSIGN <#channel> <bot>"));
    };
    let Some(bot) = ctx.network.db.bots().find_by_nick(bot_nick).await? else {
        return Err(refuse(format!("No such bot: \x02{}\x02.", bot_nick)));
    };
    ctx.network.db.channel_bots().assign(name, bot.id).await?;
    ctx.reply(format!("Bot \x02{}\x02 assigned to \x02{}\x02.", bot.nick, name));
    Ok(())
}

async fn unassign(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    require_access(ctx, name).await?;
    if !ctx.network.db.channel_bots().unassign(name).await? {
        return Err(refuse(format!("\x02{}\x02 has no bot assigned.", name)));
    }
    ctx.reply(format!("Bot unassigned from \x02{}\x02.", name));
    Ok(())
}

/// Speak as the channel's bot (SAY) or emote (ACT).
async fn puppet(ctx: &ServiceContext<'_>, args: &[&str], action: bool) -> ServiceResult {
    let name = channel_arg(args)?;
    require_access(ctx, name).await?;
    let text = rest(args, 1);
    if text.is_empty() {
        return Err(refuse("Syntax: SAY/ACT <#channel> <text>"));
    }

    let Some(assignment) = ctx.network.db.channel_bots().for_channel(name).await? else {
        return Err(refuse(format!("\x02{}\x02 has no bot assigned.", name)));
    };
    let Some(bot) = ctx.network.db.bots().get_by_id(assignment.bot_id).await? else {
        return Err(refuse("The assigned bot no longer exists."));
    };

    let body = if action {
        format!("\x01ACTION {}\x01", text)
    } else {
        text
    };
    let msg = Message::privmsg(name, body)
        .with_prefix(Prefix::new(bot.nick, bot.ident, bot.host));
    ctx.network.send_to_channel(name, &msg, None).await;
    Ok(())
}

async fn info(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    let Some(assignment) = ctx.network.db.channel_bots().for_channel(name).await? else {
        ctx.reply(format!("\x02{}\x02 has no bot assigned.", name));
        return Ok(());
    };
    let bot_nick = ctx
        .network
        .db
        .bots()
        .get_by_id(assignment.bot_id)
        .await?
        .map(|b| b.nick)
        .unwrap_or_else(|| "unknown".to_string());
    ctx.reply(format!("Bot for \x02{}\x02: {}", name, bot_nick));
    ctx.reply(format!(
        "  Greet: {}{}",
        if assignment.greet_enabled { "on" } else { "off" },
        assignment
            .greet_msg
            .as_deref()
            .map(|m| format!(" ({})", m))
            .unwrap_or_default()
    ));
    Ok(())
}

async fn set(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    require_access(ctx, name).await?;
    match args.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("GREET") => {
            let Some(flag) = args.get(2) else {
                return Err(refuse("Syntax: SET <#channel> GREET {ON|OFF}"));
            };
            let on = flag.eq_ignore_ascii_case("on");
            ctx.network
                .db
                .channel_bots()
                .set_greet(name, Some(on), None)
                .await?;
            ctx.reply(format!(
                "Greeting for \x02{}\x02 is now {}.",
                name,
                if on { "ON" } else { "OFF" }
            ));
            Ok(())
        }
        Some("GREETMSG") => {
            let text = rest(args, 2);
            if text.is_empty() {
                return Err(refuse("Syntax: SET <#channel> GREETMSG <text>"));
            }
            ctx.network
                .db
                .channel_bots()
                .set_greet(name, None, Some(&text))
                .await?;
            ctx.reply(format!("Greeting message for \x02{}\x02 set.", name));
            Ok(())
        }
        _ => Err(refuse("Syntax: SET <#channel> {GREET|GREETMSG} <value>")),
    }
}
