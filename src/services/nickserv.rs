//! NickServ - nickname registration and identification.

use async_trait::async_trait;

use crate::db::DbError;
use crate::services::{Service, ServiceContext, ServiceResult, refuse, rest};

pub struct NickServ;

#[async_trait]
impl Service for NickServ {
    fn nickname(&self) -> &'static str {
        "NickServ"
    }

    fn realname(&self) -> &'static str {
        "Nickname registration service"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["NS"]
    }

    fn uid_suffix(&self) -> char {
        'A'
    }

    fn help(&self, command: Option<&str>) -> Vec<String> {
        match command.map(|c| c.to_ascii_uppercase()) {
            Some(cmd) if cmd == "REGISTER" => vec![
                "REGISTER <password> [email]".to_string(),
                "Registers your current nickname as an account.".to_string(),
            ],
            Some(cmd) if cmd == "IDENTIFY" => vec![
                "IDENTIFY <password>".to_string(),
                "Identifies you to your account.".to_string(),
            ],
            Some(cmd) if cmd == "GHOST" => vec![
                "GHOST <nick> [password]".to_string(),
                "Disconnects a session using your nickname.".to_string(),
            ],
            _ => vec![
                "NickServ commands:".to_string(),
                "  REGISTER <password> [email]".to_string(),
                "  IDENTIFY <password>".to_string(),
                "  INFO [nick]".to_string(),
                "  SET EMAIL <address> | SET PASSWORD <new>".to_string(),
                "  GHOST <nick> [password]".to_string(),
                "  DROP".to_string(),
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
            "IDENTIFY" => identify(ctx, args).await,
            "INFO" => info(ctx, args).await,
            "SET" => set(ctx, args).await,
            "DROP" => drop_account(ctx).await,
            "GHOST" => ghost(ctx, args).await,
            _ => Err(refuse(format!(
                "Unknown command: \x02{}\x02. Use \x02HELP\x02 for a list of commands.",
                command
            ))),
        }
    }
}

async fn register(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let Some(password) = args.first() else {
        return Err(refuse("Syntax: REGISTER <password> [email]"));
    };
    if password.len() < 5 {
        return Err(refuse("Please choose a password of at least 5 characters."));
    }
    let email = args.get(1).copied();

    // The current nick becomes the account name; a concurrent duplicate
    // is settled by the accounts table's uniqueness constraint.
    let nick = ctx.source_nick.clone();
    match ctx.network.db.accounts().register(&nick, password, email).await {
        Ok(account) => {
            ctx.reply(format!("Nickname \x02{}\x02 registered to you.", account.name));
            login(ctx, &account.name).await;
            Ok(())
        }
        Err(DbError::AccountExists(_)) => {
            Err(refuse(format!("Nickname \x02{}\x02 is already registered.", nick)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn identify(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let Some(password) = args.first() else {
        return Err(refuse("Syntax: IDENTIFY <password>"));
    };
    let nick = ctx.source_nick.clone();
    match ctx.network.db.accounts().identify(&nick, password).await {
        Ok(account) => {
            ctx.reply(format!("You are now identified for \x02{}\x02.", account.name));
            login(ctx, &account.name).await;
            Ok(())
        }
        Err(DbError::AccountNotFound(_)) => {
            Err(refuse(format!("Nickname \x02{}\x02 is not registered.", nick)))
        }
        Err(DbError::InvalidPassword) => Err(refuse("Invalid password.")),
        Err(e) => Err(e.into()),
    }
}

/// Record the login on the user record and tell the network about it.
async fn login(ctx: &ServiceContext<'_>, account: &str) {
    if let Some(user) = ctx.network.users.get(ctx.source_uid) {
        let mut user = user.write().await;
        user.account = Some(account.to_string());
        user.modes.registered = true;
    }
    crate::handlers::account::broadcast_login(ctx.network, ctx.source_uid, Some(account)).await;
}

async fn info(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let name = args.first().copied().unwrap_or(ctx.source_nick.as_str());
    let Some(account) = ctx.network.db.accounts().find_by_name(name).await? else {
        return Err(refuse(format!("Nickname \x02{}\x02 is not registered.", name)));
    };
    ctx.reply(format!("Information for \x02{}\x02:", account.name));
    ctx.reply(format!(
        "  Registered: {}",
        chrono::DateTime::from_timestamp(account.registered_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    ));
    let own = ctx.source_account.as_deref() == Some(account.name.as_str());
    if own || ctx.is_operator {
        if let Some(email) = &account.email {
            ctx.reply(format!("  Email: {}", email));
        }
    }
    Ok(())
}

async fn set(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    match args.first().map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("EMAIL") => {
            let Some(email) = args.get(1) else {
                return Err(refuse("Syntax: SET EMAIL <address>"));
            };
            ctx.network.db.accounts().set_email(account_id, Some(email)).await?;
            ctx.reply(format!("Email address set to \x02{}\x02.", email));
            Ok(())
        }
        Some("PASSWORD") => {
            let new = rest(args, 1);
            if new.len() < 5 {
                return Err(refuse("Please choose a password of at least 5 characters."));
            }
            ctx.network.db.accounts().set_password(account_id, &new).await?;
            ctx.reply("Password changed.");
            Ok(())
        }
        _ => Err(refuse("Syntax: SET {EMAIL|PASSWORD} <value>")),
    }
}

async fn drop_account(ctx: &ServiceContext<'_>) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    ctx.network.db.accounts().delete(account_id).await?;
    if let Some(user) = ctx.network.users.get(ctx.source_uid) {
        let mut user = user.write().await;
        user.account = None;
        user.modes.registered = false;
    }
    crate::handlers::account::broadcast_login(ctx.network, ctx.source_uid, None).await;
    ctx.reply("Your account has been dropped.");
    Ok(())
}

async fn ghost(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let Some(nick) = args.first() else {
        return Err(refuse("Syntax: GHOST <nick> [password]"));
    };

    let authorized = match (ctx.source_account.as_deref(), args.get(1)) {
        // Identified to the account owning that nick.
        (Some(account), _) if account.eq_ignore_ascii_case(nick) => true,
        (_, Some(password)) => ctx
            .network
            .db
            .accounts()
            .identify(nick, password)
            .await
            .is_ok(),
        _ => false,
    };
    if !authorized && !ctx.is_operator {
        return Err(refuse("Access denied."));
    }

    let Some(target_uid) = ctx.network.users.uid_of_nick(nick) else {
        return Err(refuse(format!("\x02{}\x02 is not online.", nick)));
    };
    if target_uid == ctx.source_uid {
        return Err(refuse("You cannot ghost yourself."));
    }

    ctx.network
        .request_disconnect(&target_uid, "GHOST command used");
    ctx.reply(format!("\x02{}\x02 has been disconnected.", nick));
    Ok(())
}
