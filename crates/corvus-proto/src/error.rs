//! Protocol error types.

use thiserror::Error;

/// Errors produced while parsing or framing IRC protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The byte stream could not be framed into an IRC line.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] MessageParseError),

    /// An underlying I/O error from the transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while parsing a single IRC message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    #[error("empty message")]
    EmptyMessage,

    #[error("missing command")]
    MissingCommand,

    #[error("invalid command token: {0:?}")]
    InvalidCommand(String),

    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("tags exceed {limit} bytes")]
    TagsTooLong { limit: usize },

    #[error("invalid prefix: {0:?}")]
    InvalidPrefix(String),

    #[error("embedded CR or LF in message")]
    EmbeddedCrlf,
}
