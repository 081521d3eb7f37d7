//! SASL engine: AUTHENTICATE pipeline and mechanisms (PLAIN, EXTERNAL).

use async_trait::async_trait;
use corvus_proto::sasl::{SaslBufferError, parse_plain};
use corvus_proto::{Message, Response};
use tracing::debug;

use crate::error::HandlerResult;
use crate::handlers::{Context, Handler, HandlerSpec};

/// Result of feeding client bytes to a mechanism.
pub enum SaslOutcome {
    /// Send a challenge and await more data.
    Continue(Vec<u8>),
    /// Authentication succeeded for this account name.
    Success(String),
    Failure,
}

/// A SASL mechanism.
#[async_trait]
pub trait Mechanism: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mechanisms that depend on TLS state refuse plaintext connections.
    fn tls_only(&self) -> bool {
        false
    }

    async fn process(&self, client_bytes: &[u8], ctx: &MechanismContext<'_>) -> SaslOutcome;
}

/// What a mechanism may consult: the connection's certificate and the
/// credential validation callbacks backed by the account repository.
pub struct MechanismContext<'a> {
    pub network: &'a std::sync::Arc<crate::state::Network>,
    pub certfp: Option<&'a str>,
}

impl MechanismContext<'_> {
    async fn validate_password(&self, user: &str, pass: &str) -> Option<String> {
        self.network
            .db
            .accounts()
            .identify(user, pass)
            .await
            .ok()
            .map(|a| a.name)
    }

    async fn resolve_cert_subject(&self, fingerprint: &str) -> Option<String> {
        self.network
            .db
            .accounts()
            .find_by_certfp(fingerprint)
            .await
            .ok()
            .flatten()
            .map(|a| a.name)
    }
}

struct Plain;

#[async_trait]
impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    async fn process(&self, client_bytes: &[u8], ctx: &MechanismContext<'_>) -> SaslOutcome {
        if client_bytes.is_empty() {
            return SaslOutcome::Continue(Vec::new());
        }
        let Some(creds) = parse_plain(client_bytes) else {
            return SaslOutcome::Failure;
        };
        // authzid, when present, must match the authenticating identity.
        if !creds.authzid.is_empty() && !creds.authzid.eq_ignore_ascii_case(&creds.authcid) {
            return SaslOutcome::Failure;
        }
        match ctx.validate_password(&creds.authcid, &creds.password).await {
            Some(account) => SaslOutcome::Success(account),
            None => SaslOutcome::Failure,
        }
    }
}

struct External;

#[async_trait]
impl Mechanism for External {
    fn name(&self) -> &'static str {
        "EXTERNAL"
    }

    fn tls_only(&self) -> bool {
        true
    }

    async fn process(&self, client_bytes: &[u8], ctx: &MechanismContext<'_>) -> SaslOutcome {
        let Some(certfp) = ctx.certfp else {
            return SaslOutcome::Failure;
        };
        let Some(account) = ctx.resolve_cert_subject(certfp).await else {
            return SaslOutcome::Failure;
        };
        // An empty payload authorizes as the certificate owner; anything
        // else must name the same account.
        if !client_bytes.is_empty() {
            match std::str::from_utf8(client_bytes) {
                Ok(requested) if requested.eq_ignore_ascii_case(&account) => {}
                _ => return SaslOutcome::Failure,
            }
        }
        SaslOutcome::Success(account)
    }
}

fn mechanism_by_name(name: &str) -> Option<Box<dyn Mechanism>> {
    match name {
        "PLAIN" => Some(Box::new(Plain)),
        "EXTERNAL" => Some(Box::new(External)),
        _ => None,
    }
}

const MECHANISM_LIST: &str = "PLAIN,EXTERNAL";

static AUTHENTICATE_SPEC: HandlerSpec = HandlerSpec::new("AUTHENTICATE", 1).pre_registration();

/// Handler for AUTHENTICATE.
pub struct AuthenticateHandler;

#[async_trait]
impl Handler for AuthenticateHandler {
    fn spec(&self) -> &'static HandlerSpec {
        &AUTHENTICATE_SPEC
    }

    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let arg = msg.arg_or_empty(0).to_string();

        if !ctx.handshake.caps.has("sasl") {
            return ctx
                .numeric(
                    Response::ERR_SASLFAIL,
                    vec!["SASL authentication failed".to_string()],
                )
                .await;
        }

        if ctx.handshake.sasl.done {
            return ctx
                .numeric(
                    Response::ERR_SASLALREADY,
                    vec!["You have already authenticated using SASL".to_string()],
                )
                .await;
        }

        if arg == "*" {
            ctx.handshake.sasl.mechanism = None;
            ctx.handshake.sasl.buffer.reset();
            ctx.handshake.sasl.started = None;
            return ctx
                .numeric(
                    Response::ERR_SASLABORTED,
                    vec!["SASL authentication aborted".to_string()],
                )
                .await;
        }

        // Overall budget for one exchange.
        let budget = std::time::Duration::from_secs(ctx.network.timeouts.sasl);
        if ctx
            .handshake
            .sasl
            .started
            .is_some_and(|started| started.elapsed() > budget)
        {
            ctx.handshake.sasl.mechanism = None;
            ctx.handshake.sasl.buffer.reset();
            ctx.handshake.sasl.started = None;
            return ctx
                .numeric(
                    Response::ERR_SASLABORTED,
                    vec!["SASL authentication aborted (timeout)".to_string()],
                )
                .await;
        }

        // No mechanism in flight: this argument selects one.
        if ctx.handshake.sasl.mechanism.is_none() {
            let name = arg.to_ascii_uppercase();
            let Some(mechanism) = mechanism_by_name(&name) else {
                ctx.numeric(Response::RPL_SASLMECHS, vec![
                    MECHANISM_LIST.to_string(),
                    "are available SASL mechanisms".to_string(),
                ])
                .await?;
                return ctx
                    .numeric(
                        Response::ERR_SASLFAIL,
                        vec!["SASL authentication failed".to_string()],
                    )
                    .await;
            };
            if mechanism.tls_only() && !ctx.handshake.is_tls {
                return ctx
                    .numeric(
                        Response::ERR_SASLFAIL,
                        vec!["SASL authentication failed".to_string()],
                    )
                    .await;
            }
            ctx.handshake.sasl.mechanism = Some(name);
            ctx.handshake.sasl.started = Some(std::time::Instant::now());
            return ctx.send(Message::new("AUTHENTICATE", vec!["+".to_string()])).await;
        }

        // Mechanism selected: this argument is a payload chunk.
        let payload = match ctx.handshake.sasl.buffer.push(&arg) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(SaslBufferError::TooLong) => {
                ctx.handshake.sasl.mechanism = None;
                return ctx
                    .numeric(
                        Response::ERR_SASLTOOLONG,
                        vec!["SASL message too long".to_string()],
                    )
                    .await;
            }
            Err(SaslBufferError::InvalidBase64) => {
                ctx.handshake.sasl.mechanism = None;
                return ctx
                    .numeric(
                        Response::ERR_SASLFAIL,
                        vec!["SASL authentication failed".to_string()],
                    )
                    .await;
            }
        };

        let mechanism_name = ctx.handshake.sasl.mechanism.clone().unwrap_or_default();
        let Some(mechanism) = mechanism_by_name(&mechanism_name) else {
            ctx.handshake.sasl.mechanism = None;
            return ctx
                .numeric(
                    Response::ERR_SASLFAIL,
                    vec!["SASL authentication failed".to_string()],
                )
                .await;
        };
        let mech_ctx = MechanismContext {
            network: ctx.network,
            certfp: ctx.handshake.certfp.as_deref(),
        };

        match mechanism.process(&payload, &mech_ctx).await {
            SaslOutcome::Continue(challenge) => {
                ctx.send(Message::new(
                    "AUTHENTICATE",
                    vec![corvus_proto::sasl::encode_challenge(&challenge)],
                ))
                .await
            }
            SaslOutcome::Success(account) => {
                debug!(uid = %ctx.uid, account = %account, "SASL success");
                ctx.handshake.sasl.mechanism = None;
                ctx.handshake.sasl.done = true;
                ctx.handshake.account = Some(account.clone());

                // Remember the client certificate for future EXTERNAL.
                if let Some(certfp) = ctx.handshake.certfp.clone() {
                    let _ = ctx
                        .network
                        .db
                        .accounts()
                        .bind_certfp(&account, &certfp)
                        .await;
                }

                let mask = format!(
                    "{}!{}@{}",
                    ctx.nick(),
                    ctx.handshake.ident.as_deref().unwrap_or("*"),
                    ctx.handshake.peer_ip
                );
                ctx.numeric(
                    Response::RPL_LOGGEDIN,
                    vec![
                        mask,
                        account.clone(),
                        format!("You are now logged in as {}", account),
                    ],
                )
                .await?;
                ctx.numeric(
                    Response::RPL_SASLSUCCESS,
                    vec!["SASL authentication successful".to_string()],
                )
                .await?;

                // A post-registration AUTHENTICATE updates the live user.
                if ctx.handshake.is_registered() {
                    if let Some(user) = ctx.network.users.get(ctx.uid) {
                        let mut user = user.write().await;
                        user.account = Some(account.clone());
                        user.modes.registered = true;
                    }
                    super::account::broadcast_login(ctx.network, ctx.uid, Some(&account)).await;
                }
                Ok(())
            }
            SaslOutcome::Failure => {
                ctx.handshake.sasl.mechanism = None;
                ctx.numeric(
                    Response::ERR_SASLFAIL,
                    vec!["SASL authentication failed".to_string()],
                )
                .await
            }
        }
    }
}
