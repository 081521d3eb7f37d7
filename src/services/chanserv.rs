//! ChanServ - channel registration and management.

use async_trait::async_trait;
use corvus_proto::{ChannelExt, Message, Prefix};

use crate::db::{DbError, RegisteredChannel};
use crate::services::{Service, ServiceContext, ServiceResult, refuse, rest};

pub struct ChanServ;

#[async_trait]
impl Service for ChanServ {
    fn nickname(&self) -> &'static str {
        "ChanServ"
    }

    fn realname(&self) -> &'static str {
        "Channel registration service"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["CS"]
    }

    fn uid_suffix(&self) -> char {
        'B'
    }

    fn help(&self, command: Option<&str>) -> Vec<String> {
        match command.map(|c| c.to_ascii_uppercase()) {
            Some(cmd) if cmd == "REGISTER" => vec![
                "REGISTER <#channel>".to_string(),
                "Registers a channel to your account. You must be a channel operator.".to_string(),
            ],
            Some(cmd) if cmd == "SET" => vec![
                "SET <#channel> FOUNDER <account>".to_string(),
                "SET <#channel> SUCCESSOR <account>".to_string(),
                "SET <#channel> KEEPTOPIC {ON|OFF}".to_string(),
                "SET <#channel> SECURE {ON|OFF}".to_string(),
            ],
            _ => vec![
                "ChanServ commands:".to_string(),
                "  REGISTER <#channel>".to_string(),
                "  INFO <#channel>".to_string(),
                "  OP/DEOP/VOICE/DEVOICE <#channel> [nick]".to_string(),
                "  KICK <#channel> <nick> [reason]".to_string(),
                "  BAN/UNBAN <#channel> <mask>".to_string(),
                "  TOPIC <#channel> <text>".to_string(),
                "  SET <#channel> {FOUNDER|SUCCESSOR|KEEPTOPIC|SECURE} <value>".to_string(),
                "  DROP <#channel>".to_string(),
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
            "REGISTER" => register(ctx, args).await,
            "INFO" => info(ctx, args).await,
            "OP" => member_mode(ctx, args, true, 'o').await,
            "DEOP" => member_mode(ctx, args, false, 'o').await,
            "VOICE" => member_mode(ctx, args, true, 'v').await,
            "DEVOICE" => member_mode(ctx, args, false, 'v').await,
            "KICK" => kick(ctx, args).await,
            "BAN" => ban(ctx, args, true).await,
            "UNBAN" => ban(ctx, args, false).await,
            "TOPIC" => topic(ctx, args).await,
            "SET" => set(ctx, args).await,
            "DROP" => drop_channel(ctx, args).await,
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

/// Founder-or-operator gate; identity-to-account binding is authoritative.
async fn require_access(
    ctx: &ServiceContext<'_>,
    name: &str,
) -> Result<RegisteredChannel, crate::services::ServiceError> {
    let Some(registration) = ctx.network.db.channels().find_by_name(name).await? else {
        return Err(refuse(format!("Channel \x02{}\x02 is not registered.", name)));
    };
    if ctx.is_operator {
        return Ok(registration);
    }
    let account_id = ctx.require_account_id().await?;
    if registration.founder_account_id != account_id
        && registration.successor_account_id != Some(account_id)
    {
        return Err(refuse("Access denied."));
    }
    Ok(registration)
}

fn service_prefix(ctx: &ServiceContext<'_>) -> Prefix {
    Prefix::new("ChanServ", "services", ctx.network.info.name.clone())
}

async fn register(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    let account_id = ctx.require_account_id().await?;

    // Must hold ops on the live channel to claim it.
    let Some(channel) = ctx.network.channels.get(name) else {
        return Err(refuse(format!("Channel \x02{}\x02 does not exist.", name)));
    };
    {
        let channel = channel.read().await;
        if !channel.member_modes(ctx.source_uid).has_op_or_higher() && !ctx.is_operator {
            return Err(refuse("You must be a channel operator to register it."));
        }
    }

    match ctx.network.db.channels().register(name, account_id).await {
        Ok(_) => {
            ctx.network.channels.set_registered(name, true).await;
            ctx.reply(format!("Channel \x02{}\x02 registered to you.", name));
            Ok(())
        }
        Err(DbError::ChannelExists(_)) => {
            Err(refuse(format!("Channel \x02{}\x02 is already registered.", name)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn info(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    let Some(registration) = ctx.network.db.channels().find_by_name(name).await? else {
        return Err(refuse(format!("Channel \x02{}\x02 is not registered.", name)));
    };
    let founder = ctx
        .network
        .db
        .accounts()
        .get_by_id(registration.founder_account_id)
        .await?
        .map(|a| a.name)
        .unwrap_or_else(|| "unknown".to_string());
    ctx.reply(format!("Information for \x02{}\x02:", registration.name));
    ctx.reply(format!("  Founder: {}", founder));
    ctx.reply(format!(
        "  Registered: {}",
        chrono::DateTime::from_timestamp(registration.registered_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    ));
    ctx.reply(format!(
        "  Options: keeptopic={} secure={}",
        if registration.keep_topic { "on" } else { "off" },
        if registration.secure { "on" } else { "off" },
    ));
    Ok(())
}

async fn member_mode(
    ctx: &ServiceContext<'_>,
    args: &[&str],
    adding: bool,
    letter: char,
) -> ServiceResult {
    let name = channel_arg(args)?;
    require_access(ctx, name).await?;

    let target_nick = args.get(1).copied().unwrap_or(ctx.source_nick.as_str());
    let Some(target_uid) = ctx.network.users.uid_of_nick(target_nick) else {
        return Err(refuse(format!("\x02{}\x02 is not online.", target_nick)));
    };

    let Some(channel) = ctx.network.channels.get(name) else {
        return Err(refuse(format!("Channel \x02{}\x02 does not exist.", name)));
    };
    {
        let mut channel = channel.write().await;
        if !channel.set_member_mode(&target_uid, adding, letter) {
            return Err(refuse(format!(
                "\x02{}\x02 is not on \x02{}\x02.",
                target_nick, name
            )));
        }
    }
    if let Some(user) = ctx.network.users.get(&target_uid) {
        let mut user = user.write().await;
        let key = corvus_proto::irc_to_lower(name);
        if let Some(letters) = user.channels.get_mut(&key) {
            if adding && !letters.contains(&letter) {
                letters.push(letter);
            } else if !adding {
                letters.retain(|l| *l != letter);
            }
        }
    }

    let sign = if adding { "+" } else { "-" };
    let mode_msg = Message::new(
        "MODE",
        vec![
            name.to_string(),
            format!("{}{}", sign, letter),
            target_nick.to_string(),
        ],
    )
    .with_prefix(service_prefix(ctx));
    ctx.network.send_to_channel(name, &mode_msg, None).await;
    Ok(())
}

async fn kick(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    require_access(ctx, name).await?;
    let Some(target_nick) = args.get(1) else {
        return Err(refuse("Syntax: KICK <#channel> <nick> [reason]"));
    };
    let reason = {
        let r = rest(args, 2);
        if r.is_empty() { ctx.source_nick.clone() } else { r }
    };

    let Some(target_uid) = ctx.network.users.uid_of_nick(target_nick) else {
        return Err(refuse(format!("\x02{}\x02 is not online.", target_nick)));
    };
    let Some(channel) = ctx.network.channels.get(name) else {
        return Err(refuse(format!("Channel \x02{}\x02 does not exist.", name)));
    };

    let kick_msg = Message::new(
        "KICK",
        vec![name.to_string(), target_nick.to_string(), reason],
    )
    .with_prefix(service_prefix(ctx));
    ctx.network.send_to_channel(name, &kick_msg, None).await;

    channel.write().await.remove_member(&target_uid);
    if let Some(user) = ctx.network.users.get(&target_uid) {
        user.write()
            .await
            .part_channel(&corvus_proto::irc_to_lower(name));
    }
    ctx.network.channels.remove_if_empty(name).await;
    Ok(())
}

async fn ban(ctx: &ServiceContext<'_>, args: &[&str], adding: bool) -> ServiceResult {
    let name = channel_arg(args)?;
    require_access(ctx, name).await?;
    let Some(mask_or_nick) = args.get(1) else {
        return Err(refuse("Syntax: BAN/UNBAN <#channel> <mask|nick>"));
    };

    // A bare nick bans the user's current mask.
    let mask = if mask_or_nick.contains('!') || mask_or_nick.contains('@') {
        mask_or_nick.to_string()
    } else if let Some(user) = ctx.network.users.by_nick(mask_or_nick) {
        let user = user.read().await;
        format!("*!*@{}", user.visible_host)
    } else {
        mask_or_nick.to_string()
    };

    let Some(channel) = ctx.network.channels.get(name) else {
        return Err(refuse(format!("Channel \x02{}\x02 does not exist.", name)));
    };
    let changed = {
        let mut channel = channel.write().await;
        if adding {
            channel.add_ban(&mask, "ChanServ")
        } else {
            channel.remove_ban(&mask)
        }
    };
    if !changed {
        return Err(refuse(if adding {
            "That mask is already banned."
        } else {
            "No such ban."
        }));
    }

    let sign = if adding { "+b" } else { "-b" };
    let mode_msg = Message::new("MODE", vec![name.to_string(), sign.to_string(), mask])
        .with_prefix(service_prefix(ctx));
    ctx.network.send_to_channel(name, &mode_msg, None).await;
    Ok(())
}

async fn topic(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    let registration = require_access(ctx, name).await?;
    let text = rest(args, 1);

    let Some(channel) = ctx.network.channels.get(name) else {
        return Err(refuse(format!("Channel \x02{}\x02 does not exist.", name)));
    };
    channel.write().await.set_topic(text.clone(), "ChanServ");
    if registration.keep_topic {
        ctx.network
            .db
            .channels()
            .set_topic(registration.id, Some(&text))
            .await?;
    }

    let topic_msg = Message::new("TOPIC", vec![name.to_string(), text])
        .with_prefix(service_prefix(ctx));
    ctx.network.send_to_channel(name, &topic_msg, None).await;
    Ok(())
}

async fn set(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    let registration = require_access(ctx, name).await?;
    let option = args.get(1).map(|s| s.to_ascii_uppercase());
    let value = args.get(2).copied();

    match (option.as_deref(), value) {
        (Some("FOUNDER"), Some(account_name)) => {
            let Some(account) = ctx.network.db.accounts().find_by_name(account_name).await? else {
                return Err(refuse(format!(
                    "Account \x02{}\x02 is not registered.",
                    account_name
                )));
            };
            ctx.network
                .db
                .channels()
                .set_founder(registration.id, account.id)
                .await?;
            ctx.reply(format!("Founder of \x02{}\x02 set to \x02{}\x02.", name, account.name));
            Ok(())
        }
        (Some("SUCCESSOR"), Some(account_name)) => {
            let Some(account) = ctx.network.db.accounts().find_by_name(account_name).await? else {
                return Err(refuse(format!(
                    "Account \x02{}\x02 is not registered.",
                    account_name
                )));
            };
            ctx.network
                .db
                .channels()
                .set_successor(registration.id, Some(account.id))
                .await?;
            ctx.reply(format!(
                "Successor of \x02{}\x02 set to \x02{}\x02.",
                name, account.name
            ));
            Ok(())
        }
        (Some("KEEPTOPIC"), Some(flag)) => {
            let on = flag.eq_ignore_ascii_case("on");
            ctx.network
                .db
                .channels()
                .set_keep_topic(registration.id, on)
                .await?;
            ctx.reply(format!(
                "KEEPTOPIC for \x02{}\x02 is now {}.",
                name,
                if on { "ON" } else { "OFF" }
            ));
            Ok(())
        }
        (Some("SECURE"), Some(flag)) => {
            let on = flag.eq_ignore_ascii_case("on");
            ctx.network
                .db
                .channels()
                .set_secure(registration.id, on)
                .await?;
            ctx.reply(format!(
                "SECURE for \x02{}\x02 is now {}.",
                name,
                if on { "ON" } else { "OFF" }
            ));
            Ok(())
        }
        _ => Err(refuse(
            "Syntax: SET <#channel> {FOUNDER|SUCCESSOR|KEEPTOPIC|SECURE} <value>",
        )),
    }
}

async fn drop_channel(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = channel_arg(args)?;
    let registration = require_access(ctx, name).await?;
    ctx.network
        .db
        .channels()
        .drop_registration(registration.id)
        .await?;
    ctx.network.channels.set_registered(name, false).await;
    ctx.reply(format!("Channel \x02{}\x02 has been dropped.", name));
    Ok(())
}
