//! Unified error handling for corvusd.
//!
//! Handlers translate recoverable failures into numeric replies and keep
//! the connection alive; only transport-level failures unwind a session.

use corvus_proto::{Message, Response};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    #[error("permission denied")]
    NoPrivileges,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The client asked to close the connection.
    #[error("client quit: {0:?}")]
    Quit(Option<String>),

    /// Terminate the connection without further replies (bans, floods,
    /// send-queue overflow).
    #[error("access denied")]
    AccessDenied,

    #[error("send error: {0}")]
    Send(#[from] mpsc::error::SendError<Message>),

    #[error("repository error: {0}")]
    Repository(#[from] crate::db::DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Whether the owning connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Quit(_) | Self::AccessDenied | Self::Send(_))
    }

    /// Convert to a numeric reply, if this error has a client-visible form.
    pub fn to_irc_reply(&self, server_name: &str, nick: &str, cmd: &str) -> Option<Message> {
        let reply = match self {
            Self::NeedMoreParams => Message::numeric(
                server_name,
                Response::ERR_NEEDMOREPARAMS,
                vec![
                    nick.to_string(),
                    cmd.to_string(),
                    "Not enough parameters".to_string(),
                ],
            ),
            Self::NotRegistered => Message::numeric(
                server_name,
                Response::ERR_NOTREGISTERED,
                vec!["*".to_string(), "You have not registered".to_string()],
            ),
            Self::AlreadyRegistered => Message::numeric(
                server_name,
                Response::ERR_ALREADYREGISTRED,
                vec![nick.to_string(), "You may not reregister".to_string()],
            ),
            Self::NoPrivileges => Message::numeric(
                server_name,
                Response::ERR_NOPRIVILEGES,
                vec![
                    nick.to_string(),
                    "Permission Denied - You're not an IRC operator".to_string(),
                ],
            ),
            Self::UnknownCommand(unknown) => Message::numeric(
                server_name,
                Response::ERR_UNKNOWNCOMMAND,
                vec![
                    nick.to_string(),
                    unknown.clone(),
                    "Unknown command".to_string(),
                ],
            ),
            Self::Repository(_) => Message::notice(
                nick,
                "A temporary server error occurred, please try again later",
            )
            .with_prefix(corvus_proto::Prefix::ServerName(server_name.to_string())),
            Self::Quit(_) | Self::AccessDenied | Self::Send(_) | Self::Internal(_) => return None,
        };
        Some(reply)
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors on a server-to-server link. Any of these SQUITs the neighbor.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("link closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
