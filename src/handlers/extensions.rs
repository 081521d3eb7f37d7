//! Extension subsystems and their management commands.
//!
//! Module loading, scripting, triggers and plugins are external
//! collaborators. The dispatcher receives a static capability record at
//! construction; a command whose subsystem is absent answers with an
//! IRCv3 `FAIL` standard reply instead of probing at runtime.

use std::sync::Arc;

use async_trait::async_trait;
use corvus_proto::Message;

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec, standard_reply};

/// Contract for a dynamic module host.
#[async_trait]
pub trait ModuleManager: Send + Sync {
    async fn load(&self, name: &str) -> Result<(), String>;
    async fn unload(&self, name: &str) -> Result<(), String>;
    fn loaded(&self) -> Vec<String>;
}

/// Contract for an embedded script engine.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    async fn run(&self, name: &str) -> Result<(), String>;
    fn scripts(&self) -> Vec<String>;
}

/// Contract for a trigger engine.
pub trait TriggerEngine: Send + Sync {
    fn triggers(&self) -> Vec<String>;
}

/// Contract for a plugin host.
pub trait PluginHost: Send + Sync {
    fn plugins(&self) -> Vec<String>;
}

/// The static capability record handed to the dispatcher: every optional
/// subsystem is an explicit field, resolved once.
#[derive(Default)]
pub struct Extensions {
    pub modules: Option<Arc<dyn ModuleManager>>,
    pub scripts: Option<Arc<dyn ScriptEngine>>,
    pub triggers: Option<Arc<dyn TriggerEngine>>,
    pub plugins: Option<Arc<dyn PluginHost>>,
}

async fn unavailable(ctx: &Context<'_>, command: &str) -> HandlerResult {
    ctx.send(standard_reply(
        ctx.server_name(),
        "FAIL",
        command,
        "SUBSYSTEM_UNAVAILABLE",
        "That subsystem is not loaded on this server",
    ))
    .await
}

static LOADMOD_SPEC: HandlerSpec = HandlerSpec::new("LOADMOD", 1).oper_only();

/// Handler for LOADMOD.
pub struct LoadmodHandler;

#[async_trait]
impl Handler for LoadmodHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &LOADMOD_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        // The registry owns the capability record; reach it through the
        // network's configured extensions when present.
        let name = msg.arg_or_empty(0).to_string();
        match &ctx.network.extensions().modules {
            Some(modules) => {
                let reply = match modules.load(&name).await {
                    Ok(()) => format!("Module {} loaded", name),
                    Err(e) => format!("Module {} failed to load: {}", name, e),
                };
                ctx.send(super::server_notice(ctx.server_name(), ctx.nick(), reply))
                    .await
            }
            None => unavailable(ctx, "LOADMOD").await,
        }
    }
}

static SCRIPTS_SPEC: HandlerSpec = HandlerSpec::new("SCRIPTS", 0).oper_only();

/// Handler for the SCRIPTS family.
pub struct ScriptsHandler;

#[async_trait]
impl Handler for ScriptsHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &SCRIPTS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        match &ctx.network.extensions().scripts {
            Some(engine) => {
                let listing = engine.scripts().join(", ");
                ctx.send(super::server_notice(
                    ctx.server_name(),
                    ctx.nick(),
                    format!("Scripts: {}", listing),
                ))
                .await
            }
            None => unavailable(ctx, "SCRIPTS").await,
        }
    }
}

static TRIGGERS_SPEC: HandlerSpec = HandlerSpec::new("TRIGGERS", 0).oper_only();

/// Handler for the TRIGGERS family.
pub struct TriggersHandler;

#[async_trait]
impl Handler for TriggersHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &TRIGGERS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        match &ctx.network.extensions().triggers {
            Some(engine) => {
                let listing = engine.triggers().join(", ");
                ctx.send(super::server_notice(
                    ctx.server_name(),
                    ctx.nick(),
                    format!("Triggers: {}", listing),
                ))
                .await
            }
            None => unavailable(ctx, "TRIGGERS").await,
        }
    }
}

static PLUGINS_SPEC: HandlerSpec = HandlerSpec::new("PLUGINS", 0).oper_only();

/// Handler for the PLUGINS family.
pub struct PluginsHandler;

#[async_trait]
impl Handler for PluginsHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &PLUGINS_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, _msg: &Message) -> HandlerResult {
        match &ctx.network.extensions().plugins {
            Some(host) => {
                let listing = host.plugins().join(", ");
                ctx.send(super::server_notice(
                    ctx.server_name(),
                    ctx.nick(),
                    format!("Plugins: {}", listing),
                ))
                .await
            }
            None => unavailable(ctx, "PLUGINS").await,
        }
    }
}
