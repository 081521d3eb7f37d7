//! Server query handlers: MOTD, LUSERS, VERSION, TIME, ADMIN, INFO,
//! STATS, LINKS, TRACE, plus the ISUPPORT burst.

use async_trait::async_trait;
use corvus_proto::mode::prefix_isupport_value;
use corvus_proto::{ChannelModeSpec, IsupportBuilder, Message, Response};

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec};
use crate::security::BanKind;

/// RPL_ISUPPORT (005) lines for this server's limits and grammar.
pub async fn send_isupport(ctx: &Context<'_>) -> HandlerResult {
    let limits = &ctx.network.limits;
    let builder = IsupportBuilder::new()
        .value("NETWORK", &ctx.network.info.network)
        .value("CASEMAPPING", "rfc1459")
        .value("CHANTYPES", "#&")
        .value("CHANMODES", ChannelModeSpec::isupport_value())
        .value("PREFIX", prefix_isupport_value())
        .value("NICKLEN", limits.max_nick_length)
        .value("CHANNELLEN", limits.max_channel_length)
        .value("TOPICLEN", limits.max_topic_length)
        .value("CHANLIMIT", format!("#&:{}", limits.max_channels_per_user))
        .value("MONITOR", limits.max_monitor_entries)
        .value("MODES", 4)
        .value("EXCEPTS", "e")
        .value("INVEX", "I")
        .flag("WHOX");

    for line in builder.lines() {
        let mut params = line;
        params.push("are supported by this server".to_string());
        ctx.numeric(Response::RPL_ISUPPORT, params).await?;
    }
    Ok(())
}

/// The LUSERS block (251-255, 265-266).
pub async fn send_lusers(ctx: &Context<'_>) -> HandlerResult {
    let snap = ctx.network.stats.snapshot();
    ctx.numeric(
        Response::RPL_LUSERCLIENT,
        vec![format!(
            "There are {} users and {} invisible on {} servers",
            snap.visible(),
            snap.invisible,
            snap.servers + 1
        )],
    )
    .await?;
    ctx.numeric(
        Response::RPL_LUSEROP,
        vec![
            snap.opers.to_string(),
            "operator(s) online".to_string(),
        ],
    )
    .await?;
    if snap.unregistered > 0 {
        ctx.numeric(
            Response::RPL_LUSERUNKNOWN,
            vec![
                snap.unregistered.to_string(),
                "unknown connection(s)".to_string(),
            ],
        )
        .await?;
    }
    ctx.numeric(
        Response::RPL_LUSERCHANNELS,
        vec![snap.channels.to_string(), "channels formed".to_string()],
    )
    .await?;
    ctx.numeric(
        Response::RPL_LUSERME,
        vec![format!(
            "I have {} clients and {} servers",
            snap.local_users, snap.servers
        )],
    )
    .await?;
    ctx.numeric(
        Response::RPL_LOCALUSERS,
        vec![
            snap.local_users.to_string(),
            snap.max_local_users.to_string(),
            format!(
                "Current local users {}, max {}",
                snap.local_users, snap.max_local_users
            ),
        ],
    )
    .await?;
    ctx.numeric(
        Response::RPL_GLOBALUSERS,
        vec![
            snap.total_users().to_string(),
            snap.max_local_users.to_string(),
            format!(
                "Current global users {}, max {}",
                snap.total_users(),
                snap.max_local_users
            ),
        ],
    )
    .await
}

/// The MOTD block (375/372/376), or 422 when no MOTD is configured.
pub async fn send_motd(ctx: &Context<'_>) -> HandlerResult {
    let lines = ctx.network.hot_config.read().motd_lines.clone();
    if lines.is_empty() {
        return ctx
            .numeric(
                Response::ERR_NOMOTD,
                vec!["MOTD File is missing".to_string()],
            )
            .await;
    }
    ctx.numeric(
        Response::RPL_MOTDSTART,
        vec![format!("- {} Message of the day -", ctx.server_name())],
    )
    .await?;
    for line in lines {
        ctx.numeric(Response::RPL_MOTD, vec![format!("- {}", line)]).await?;
    }
    ctx.numeric(Response::RPL_ENDOFMOTD, vec!["End of /MOTD command".to_string()])
        .await
}

static MOTD_SPEC: HandlerSpec = HandlerSpec::new("MOTD", 0);

/// Handler for MOTD.
pub struct MotdHandler;

#[async_trait]
impl Handler for MotdHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &MOTD_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        send_motd(ctx).await
    }
}

static LUSERS_SPEC: HandlerSpec = HandlerSpec::new("LUSERS", 0);

/// Handler for LUSERS.
pub struct LusersHandler;

#[async_trait]
impl Handler for LusersHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &LUSERS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        send_lusers(ctx).await
    }
}

static VERSION_SPEC: HandlerSpec = HandlerSpec::new("VERSION", 0);

/// Handler for VERSION.
pub struct VersionHandler;

#[async_trait]
impl Handler for VersionHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &VERSION_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        ctx.numeric(
            Response::RPL_VERSION,
            vec![
                format!("corvusd-{}", env!("CARGO_PKG_VERSION")),
                ctx.server_name().to_string(),
                String::new(),
            ],
        )
        .await?;
        send_isupport(ctx).await
    }
}

static TIME_SPEC: HandlerSpec = HandlerSpec::new("TIME", 0);

/// Handler for TIME.
pub struct TimeHandler;

#[async_trait]
impl Handler for TimeHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &TIME_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        ctx.numeric(
            Response::RPL_TIME,
            vec![
                ctx.server_name().to_string(),
                chrono::Utc::now()
                    .format("%A %B %d %Y -- %H:%M:%S UTC")
                    .to_string(),
            ],
        )
        .await
    }
}

static ADMIN_SPEC: HandlerSpec = HandlerSpec::new("ADMIN", 0);

/// Handler for ADMIN.
pub struct AdminHandler;

#[async_trait]
impl Handler for AdminHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &ADMIN_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        let (description, email) = {
            let hot = ctx.network.hot_config.read();
            (hot.description.clone(), hot.admin_email.clone())
        };
        let Some(email) = email else {
            return ctx
                .numeric(
                    Response::ERR_NOADMININFO,
                    vec![
                        ctx.server_name().to_string(),
                        "No administrative info available".to_string(),
                    ],
                )
                .await;
        };
        ctx.numeric(
            Response::RPL_ADMINME,
            vec![
                ctx.server_name().to_string(),
                "Administrative info".to_string(),
            ],
        )
        .await?;
        ctx.numeric(Response::RPL_ADMINLOC1, vec![description]).await?;
        ctx.numeric(
            Response::RPL_ADMINLOC2,
            vec![ctx.network.info.network.clone()],
        )
        .await?;
        ctx.numeric(Response::RPL_ADMINEMAIL, vec![email]).await
    }
}

static INFO_SPEC: HandlerSpec = HandlerSpec::new("INFO", 0);

/// Handler for INFO.
pub struct InfoHandler;

#[async_trait]
impl Handler for InfoHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &INFO_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        let description = ctx.network.hot_config.read().description.clone();
        for line in [
            format!("corvusd {}", env!("CARGO_PKG_VERSION")),
            description,
            "https://github.com/corvus-irc/corvusd".to_string(),
        ] {
            ctx.numeric(Response::RPL_INFO, vec![line]).await?;
        }
        ctx.numeric(Response::RPL_ENDOFINFO, vec!["End of /INFO list".to_string()])
            .await
    }
}

static STATS_SPEC: HandlerSpec = HandlerSpec::new("STATS", 1);

/// Handler for STATS. `u` uptime, `m` commands, `o` oper blocks,
/// `k`/`g` ban lists (operator only for the ban letters).
pub struct StatsHandler;

#[async_trait]
impl Handler for StatsHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &STATS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let letter = msg.arg_or_empty(0).chars().next().unwrap_or('?');

        match letter {
            'u' => {
                let snap = ctx.network.stats.snapshot();
                let (days, rem) = (snap.uptime_secs / 86400, snap.uptime_secs % 86400);
                ctx.numeric(
                    Response::RPL_STATSUPTIME,
                    vec![format!(
                        "Server Up {} days {}:{:02}:{:02}",
                        days,
                        rem / 3600,
                        (rem % 3600) / 60,
                        rem % 60
                    )],
                )
                .await?;
            }
            'm' => {
                let snap = ctx.network.stats.snapshot();
                ctx.numeric(
                    Response::RPL_STATSCOMMANDS,
                    vec![
                        "TOTAL".to_string(),
                        snap.commands_processed.to_string(),
                    ],
                )
                .await?;
            }
            'o' => {
                let blocks = ctx.network.hot_config.read().oper_blocks.clone();
                for block in blocks {
                    ctx.numeric(
                        Response::RPL_STATSOLINE,
                        vec![
                            "O".to_string(),
                            block.hostmasks.first().cloned().unwrap_or_else(|| "*".to_string()),
                            "*".to_string(),
                            block.name,
                            block.class,
                        ],
                    )
                    .await?;
                }
            }
            'k' | 'g' if ctx.handshake.is_oper => {
                let kind = if letter == 'k' { BanKind::K } else { BanKind::G };
                for ban in ctx.network.bans.list(kind) {
                    ctx.numeric(
                        Response::RPL_STATSKLINE,
                        vec![
                            "K".to_string(),
                            ban.mask,
                            "*".to_string(),
                            ban.reason,
                        ],
                    )
                    .await?;
                }
            }
            _ => {}
        }

        ctx.numeric(
            Response::RPL_ENDOFSTATS,
            vec![letter.to_string(), "End of /STATS report".to_string()],
        )
        .await
    }
}

static HELP_SPEC: HandlerSpec = HandlerSpec::new("HELP", 0);

/// Handler for HELP (704/705/706).
pub struct HelpHandler;

const HELP_TOPICS: &[(&str, &[&str])] = &[
    ("JOIN", &["JOIN <channel>[,<channel>] [key[,key]]", "Joins the given channels."]),
    ("PART", &["PART <channel>[,<channel>] [reason]", "Leaves the given channels."]),
    ("PRIVMSG", &["PRIVMSG <target>[,<target>] <text>", "Sends a message to a user or channel."]),
    ("MODE", &["MODE <target> [modes] [args]", "Queries or changes channel or user modes."]),
    ("MONITOR", &["MONITOR +/-/C/L/S [targets]", "Manages presence notifications."]),
    ("OPER", &["OPER <name> <password>", "Authenticates as an IRC operator."]),
];

#[async_trait]
impl Handler for HelpHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &HELP_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let topic = msg.arg(0).map(|t| t.to_ascii_uppercase());

        match topic {
            Some(topic) => {
                let Some((name, lines)) = HELP_TOPICS.iter().find(|(name, _)| *name == topic)
                else {
                    return ctx
                        .numeric(
                            Response::RPL_HELPSTART,
                            vec![topic, "No help available on this topic".to_string()],
                        )
                        .await;
                };
                ctx.numeric(
                    Response::RPL_HELPSTART,
                    vec![name.to_string(), lines[0].to_string()],
                )
                .await?;
                for line in &lines[1..] {
                    ctx.numeric(
                        Response::RPL_HELPTXT,
                        vec![name.to_string(), line.to_string()],
                    )
                    .await?;
                }
                ctx.numeric(
                    Response::RPL_ENDOFHELP,
                    vec![name.to_string(), "End of /HELP".to_string()],
                )
                .await
            }
            None => {
                ctx.numeric(
                    Response::RPL_HELPSTART,
                    vec!["*".to_string(), "Help topics:".to_string()],
                )
                .await?;
                let listing = HELP_TOPICS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(" ");
                ctx.numeric(Response::RPL_HELPTXT, vec!["*".to_string(), listing])
                    .await?;
                ctx.numeric(
                    Response::RPL_ENDOFHELP,
                    vec!["*".to_string(), "End of /HELP".to_string()],
                )
                .await
            }
        }
    }
}

static LINKS_SPEC: HandlerSpec = HandlerSpec::new("LINKS", 0);

/// Handler for LINKS.
pub struct LinksHandler;

#[async_trait]
impl Handler for LinksHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &LINKS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        let description = ctx.network.hot_config.read().description.clone();
        ctx.numeric(
            Response::RPL_LINKS,
            vec![
                ctx.server_name().to_string(),
                ctx.server_name().to_string(),
                format!("0 {}", description),
            ],
        )
        .await?;
        for node in ctx.network.links.all_servers() {
            ctx.numeric(
                Response::RPL_LINKS,
                vec![
                    node.name.clone(),
                    ctx.server_name().to_string(),
                    format!("{} {}", node.hop, node.description),
                ],
            )
            .await?;
        }
        ctx.numeric(
            Response::RPL_ENDOFLINKS,
            vec!["*".to_string(), "End of /LINKS list".to_string()],
        )
        .await
    }
}

static TRACE_SPEC: HandlerSpec = HandlerSpec::new("TRACE", 0).oper_only();

/// Handler for TRACE.
pub struct TraceHandler;

#[async_trait]
impl Handler for TraceHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &TRACE_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        for peer in ctx.network.links.direct_links() {
            ctx.numeric(
                Response::RPL_TRACESERVER,
                vec![
                    "Serv".to_string(),
                    peer.name.clone(),
                    format!("*!*@{}", peer.name),
                ],
            )
            .await?;
        }
        for uid in ctx.network.users.local_uids() {
            let Some(user) = ctx.network.users.get(&uid) else {
                continue;
            };
            let (nick, host, oper) = {
                let user = user.read().await;
                (user.nick.clone(), user.visible_host.clone(), user.modes.oper)
            };
            ctx.numeric(
                Response::RPL_TRACEUSER,
                vec![
                    if oper { "Oper" } else { "User" }.to_string(),
                    "users".to_string(),
                    format!("{}[{}]", nick, host),
                ],
            )
            .await?;
        }
        ctx.numeric(
            Response::RPL_TRACEEND,
            vec![
                ctx.server_name().to_string(),
                format!("corvusd-{}", env!("CARGO_PKG_VERSION")),
                "End of TRACE".to_string(),
            ],
        )
        .await
    }
}
