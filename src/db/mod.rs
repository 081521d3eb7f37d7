//! Database module for persistent storage.
//!
//! Async SQLite access through SQLx. The core only talks to the
//! repository types exported here; everything else (schema, pool) is an
//! implementation detail. Repository failures never crash a handler:
//! they surface as [`DbError`] and become a generic "try again later"
//! notice (see `error.rs`).

mod accounts;
mod bans;
mod bots;
mod channels;
mod memos;
mod messages;
mod vhosts;

pub use accounts::{Account, AccountRepository};
pub use bans::{ServerBanRecord, ServerBanRepository};
pub use bots::{Bot, BotRepository, ChannelBot, ChannelBotRepository};
pub use channels::{RegisteredChannel, RegisteredChannelRepository};
pub use memos::{Memo, MemoRepository};
pub use messages::{MessageRepository, StoredMessage};
pub use vhosts::{VhostStatus, VirtualHost, VirtualHostRepository};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("account already exists: {0}")]
    AccountExists(String),
    #[error("channel already registered: {0}")]
    ChannelExists(String),
    #[error("invalid password")]
    InvalidPassword,
    #[error("not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout; prevents connection storms from
    /// blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let options = if path == ":memory:" {
            SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true)
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(parent);
                }
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn accounts(&self) -> AccountRepository<'_> {
        AccountRepository::new(&self.pool)
    }

    pub fn channels(&self) -> RegisteredChannelRepository<'_> {
        RegisteredChannelRepository::new(&self.pool)
    }

    pub fn vhosts(&self) -> VirtualHostRepository<'_> {
        VirtualHostRepository::new(&self.pool)
    }

    pub fn memos(&self) -> MemoRepository<'_> {
        MemoRepository::new(&self.pool)
    }

    pub fn bans(&self) -> ServerBanRepository<'_> {
        ServerBanRepository::new(&self.pool)
    }

    pub fn bots(&self) -> BotRepository<'_> {
        BotRepository::new(&self.pool)
    }

    pub fn channel_bots(&self) -> ChannelBotRepository<'_> {
        ChannelBotRepository::new(&self.pool)
    }

    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(&self.pool)
    }

    /// Embedded schema, applied idempotently at startup.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        const SCHEMA: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                email TEXT,
                certfp TEXT,
                registered_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS registered_channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                founder_account_id INTEGER NOT NULL REFERENCES accounts(id),
                successor_account_id INTEGER REFERENCES accounts(id),
                topic TEXT,
                keep_topic INTEGER NOT NULL DEFAULT 0,
                secure INTEGER NOT NULL DEFAULT 0,
                registered_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vhosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                vhost TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                requested_at INTEGER NOT NULL,
                actioned_at INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS memos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_account_id INTEGER NOT NULL REFERENCES accounts(id),
                sender TEXT NOT NULL,
                body TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                unread INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS server_bans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                mask TEXT NOT NULL,
                reason TEXT NOT NULL,
                set_by TEXT NOT NULL,
                set_at INTEGER NOT NULL,
                expires_at INTEGER,
                UNIQUE (kind, mask)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nick TEXT NOT NULL UNIQUE COLLATE NOCASE,
                ident TEXT NOT NULL,
                host TEXT NOT NULL,
                realname TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS channel_bots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL UNIQUE COLLATE NOCASE,
                bot_id INTEGER NOT NULL REFERENCES bots(id),
                greet_enabled INTEGER NOT NULL DEFAULT 0,
                greet_msg TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                msgid TEXT NOT NULL UNIQUE,
                target TEXT NOT NULL COLLATE NOCASE,
                sender TEXT NOT NULL,
                account TEXT,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                sent_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_memos_recipient ON memos(recipient_account_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_target_time ON messages(target, sent_at)",
            "CREATE INDEX IF NOT EXISTS idx_vhosts_account ON vhosts(account_id)",
        ];

        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }
}
