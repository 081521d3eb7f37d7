//! HostServ - virtual host requests and assignment.

use async_trait::async_trait;

use crate::db::VhostStatus;
use crate::services::{Service, ServiceContext, ServiceResult, refuse};

pub struct HostServ;

#[async_trait]
impl Service for HostServ {
    fn nickname(&self) -> &'static str {
        "HostServ"
    }

    fn realname(&self) -> &'static str {
        "Virtual host service"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["HS"]
    }

    fn uid_suffix(&self) -> char {
        'E'
    }

    fn help(&self, command: Option<&str>) -> Vec<String> {
        match command.map(|c| c.to_ascii_uppercase()) {
            Some(cmd) if cmd == "REQUEST" => vec![
                "REQUEST <vhost>".to_string(),
                "Requests a virtual host; an operator must approve it.".to_string(),
            ],
            _ => vec![
                "HostServ commands:".to_string(),
                "  REQUEST <vhost>".to_string(),
                "  ACTIVATE".to_string(),
                "  OFF".to_string(),
                "  DELETE".to_string(),
                "  LIST".to_string(),
                "Operator commands:".to_string(),
                "  APPROVE <nick> | REJECT <nick> | WAITING".to_string(),
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
            "REQUEST" => request(ctx, args).await,
            "ACTIVATE" => activate(ctx).await,
            "OFF" => off(ctx).await,
            "DELETE" => delete(ctx).await,
            "LIST" => list(ctx).await,
            "APPROVE" => approve(ctx, args, VhostStatus::Approved).await,
            "REJECT" => approve(ctx, args, VhostStatus::Rejected).await,
            "WAITING" => waiting(ctx).await,
            _ => Err(refuse(format!(
                "Unknown command: \x02{}\x02. Use \x02HELP\x02 for a list of commands.",
                command
            ))),
        }
    }
}

fn valid_vhost(vhost: &str) -> bool {
    !vhost.is_empty()
        && vhost.len() <= 63
        && vhost
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/'))
        && !vhost.starts_with('.')
        && !vhost.ends_with('.')
}

async fn request(ctx: &ServiceContext<'_>, args: &[&str]) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let Some(vhost) = args.first() else {
        return Err(refuse("Syntax: REQUEST <vhost>"));
    };
    if !valid_vhost(vhost) {
        return Err(refuse("That is not a valid hostname."));
    }
    ctx.network.db.vhosts().request(account_id, vhost).await?;
    ctx.reply(format!(
        "Virtual host \x02{}\x02 requested; awaiting operator approval.",
        vhost
    ));
    Ok(())
}

/// Apply the caller's approved vhost to their live session.
async fn activate(ctx: &ServiceContext<'_>) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let Some(vhost) = ctx.network.db.vhosts().approved_for(account_id).await? else {
        return Err(refuse("You have no approved virtual host."));
    };
    set_visible_host(ctx, ctx.source_uid, Some(&vhost.vhost)).await;
    ctx.reply(format!("Your virtual host \x02{}\x02 is now active.", vhost.vhost));
    Ok(())
}

async fn off(ctx: &ServiceContext<'_>) -> ServiceResult {
    ctx.require_account_id().await?;
    set_visible_host(ctx, ctx.source_uid, None).await;
    ctx.reply("Your virtual host has been deactivated.");
    Ok(())
}

async fn delete(ctx: &ServiceContext<'_>) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let vhosts = ctx.network.db.vhosts().for_account(account_id).await?;
    if vhosts.is_empty() {
        return Err(refuse("You have no virtual hosts."));
    }
    for vhost in vhosts {
        ctx.network.db.vhosts().delete(vhost.id).await?;
    }
    set_visible_host(ctx, ctx.source_uid, None).await;
    ctx.reply("Your virtual hosts have been deleted.");
    Ok(())
}

async fn list(ctx: &ServiceContext<'_>) -> ServiceResult {
    let account_id = ctx.require_account_id().await?;
    let vhosts = ctx.network.db.vhosts().for_account(account_id).await?;
    if vhosts.is_empty() {
        ctx.reply("You have no virtual hosts.");
        return Ok(());
    }
    for vhost in vhosts {
        ctx.reply(format!("  {} ({})", vhost.vhost, vhost.status.as_str()));
    }
    Ok(())
}

async fn approve(ctx: &ServiceContext<'_>, args: &[&str], status: VhostStatus) -> ServiceResult {
    if !ctx.is_operator {
        return Err(refuse("Access denied."));
    }
    let Some(nick) = args.first() else {
        return Err(refuse("Syntax: APPROVE/REJECT <nick>"));
    };
    let Some(account) = ctx.network.db.accounts().find_by_name(nick).await? else {
        return Err(refuse(format!("Nickname \x02{}\x02 is not registered.", nick)));
    };

    let pending = ctx.network.db.vhosts().get_pending().await?;
    let Some(vhost) = pending.iter().find(|v| v.account_id == account.id) else {
        return Err(refuse(format!("\x02{}\x02 has no pending request.", nick)));
    };

    ctx.network.db.vhosts().set_status(vhost.id, status).await?;
    match status {
        VhostStatus::Approved => {
            // Apply immediately when the owner is online and identified.
            if let Some(user) = ctx.network.users.by_nick(nick) {
                let (uid, identified) = {
                    let user = user.read().await;
                    (
                        user.uid.clone(),
                        user.account.as_deref() == Some(account.name.as_str()),
                    )
                };
                if identified {
                    set_visible_host(ctx, &uid, Some(&vhost.vhost)).await;
                }
            }
            ctx.reply(format!("Approved \x02{}\x02 for \x02{}\x02.", vhost.vhost, nick));
        }
        _ => ctx.reply(format!("Rejected the request from \x02{}\x02.", nick)),
    }
    Ok(())
}

async fn waiting(ctx: &ServiceContext<'_>) -> ServiceResult {
    if !ctx.is_operator {
        return Err(refuse("Access denied."));
    }
    let pending = ctx.network.db.vhosts().get_pending().await?;
    if pending.is_empty() {
        ctx.reply("No pending virtual host requests.");
        return Ok(());
    }
    for vhost in pending {
        let owner = ctx
            .network
            .db
            .accounts()
            .get_by_id(vhost.account_id)
            .await?
            .map(|a| a.name)
            .unwrap_or_else(|| format!("account #{}", vhost.account_id));
        ctx.reply(format!("  {} requested by {}", vhost.vhost, owner));
    }
    Ok(())
}

/// Swap a user's displayed host; `None` restores the cloak.
async fn set_visible_host(ctx: &ServiceContext<'_>, uid: &str, vhost: Option<&str>) {
    let Some(user) = ctx.network.users.get(uid) else {
        return;
    };
    let mut user = user.write().await;
    match vhost {
        Some(vhost) => user.visible_host = vhost.to_string(),
        None => {
            user.visible_host = crate::security::cloak::visible_host(
                &user.host,
                &user.ip,
                &ctx.network.security.cloak_secret,
                &ctx.network.security.cloak_suffix,
                ctx.network.security.cloak_hostnames,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::valid_vhost;

    #[test]
    fn vhost_validation() {
        assert!(valid_vhost("staff/alice"));
        assert!(valid_vhost("cool.host.example"));
        assert!(!valid_vhost(""));
        assert!(!valid_vhost(".leading.dot"));
        assert!(!valid_vhost("has space"));
        assert!(!valid_vhost("bad!char"));
    }
}
