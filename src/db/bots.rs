//! Bot and channel-bot repositories (BotServ backing store).

use sqlx::SqlitePool;

use super::DbError;

/// A network bot definition.
#[derive(Debug, Clone)]
pub struct Bot {
    pub id: i64,
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realname: String,
}

type BotRow = (i64, String, String, String, String);

fn bot_from_row((id, nick, ident, host, realname): BotRow) -> Bot {
    Bot {
        id,
        nick,
        ident,
        host,
        realname,
    }
}

/// Repository for bot definitions.
pub struct BotRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BotRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        nick: &str,
        ident: &str,
        host: &str,
        realname: &str,
    ) -> Result<Bot, DbError> {
        let result =
            sqlx::query("INSERT INTO bots (nick, ident, host, realname) VALUES (?, ?, ?, ?)")
                .bind(nick)
                .bind(ident)
                .bind(host)
                .bind(realname)
                .execute(self.pool)
                .await?;
        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Bot>, DbError> {
        let row = sqlx::query_as::<_, BotRow>(
            "SELECT id, nick, ident, host, realname FROM bots WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(bot_from_row))
    }

    pub async fn find_by_nick(&self, nick: &str) -> Result<Option<Bot>, DbError> {
        let row = sqlx::query_as::<_, BotRow>(
            "SELECT id, nick, ident, host, realname FROM bots WHERE nick = ? COLLATE NOCASE",
        )
        .bind(nick)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(bot_from_row))
    }

    pub async fn all(&self) -> Result<Vec<Bot>, DbError> {
        let rows = sqlx::query_as::<_, BotRow>(
            "SELECT id, nick, ident, host, realname FROM bots ORDER BY nick",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(bot_from_row).collect())
    }
}

/// A bot assignment to a channel.
#[derive(Debug, Clone)]
pub struct ChannelBot {
    pub id: i64,
    pub channel: String,
    pub bot_id: i64,
    pub greet_enabled: bool,
    pub greet_msg: Option<String>,
}

type ChannelBotRow = (i64, String, i64, bool, Option<String>);

fn channel_bot_from_row((id, channel, bot_id, greet_enabled, greet_msg): ChannelBotRow) -> ChannelBot {
    ChannelBot {
        id,
        channel,
        bot_id,
        greet_enabled,
        greet_msg,
    }
}

/// Repository for channel-bot assignments.
pub struct ChannelBotRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelBotRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Assign a bot to a channel, replacing any previous assignment.
    pub async fn assign(&self, channel: &str, bot_id: i64) -> Result<ChannelBot, DbError> {
        sqlx::query(
            "INSERT INTO channel_bots (channel, bot_id) VALUES (?, ?) \
             ON CONFLICT (channel) DO UPDATE SET bot_id = excluded.bot_id",
        )
        .bind(channel)
        .bind(bot_id)
        .execute(self.pool)
        .await?;
        self.for_channel(channel).await?.ok_or(DbError::NotFound)
    }

    pub async fn unassign(&self, channel: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM channel_bots WHERE channel = ? COLLATE NOCASE")
            .bind(channel)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn for_channel(&self, channel: &str) -> Result<Option<ChannelBot>, DbError> {
        let row = sqlx::query_as::<_, ChannelBotRow>(
            "SELECT id, channel, bot_id, greet_enabled, greet_msg FROM channel_bots \
             WHERE channel = ? COLLATE NOCASE",
        )
        .bind(channel)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(channel_bot_from_row))
    }

    pub async fn set_greet(
        &self,
        channel: &str,
        enabled: Option<bool>,
        msg: Option<&str>,
    ) -> Result<(), DbError> {
        if let Some(enabled) = enabled {
            sqlx::query("UPDATE channel_bots SET greet_enabled = ? WHERE channel = ? COLLATE NOCASE")
                .bind(enabled)
                .bind(channel)
                .execute(self.pool)
                .await?;
        }
        if let Some(msg) = msg {
            sqlx::query("UPDATE channel_bots SET greet_msg = ? WHERE channel = ? COLLATE NOCASE")
                .bind(msg)
                .bind(channel)
                .execute(self.pool)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn bot_assignment_flow() {
        let db = Database::new(":memory:").await.unwrap();
        let bot = db
            .bots()
            .create("Guard", "guard", "services.test", "Channel guard")
            .await
            .unwrap();
        assert!(db.bots().find_by_nick("guard").await.unwrap().is_some());

        let assigned = db.channel_bots().assign("#rust", bot.id).await.unwrap();
        assert_eq!(assigned.bot_id, bot.id);
        assert!(!assigned.greet_enabled);

        db.channel_bots()
            .set_greet("#rust", Some(true), Some("Welcome!"))
            .await
            .unwrap();
        let reloaded = db.channel_bots().for_channel("#RUST").await.unwrap().unwrap();
        assert!(reloaded.greet_enabled);
        assert_eq!(reloaded.greet_msg.as_deref(), Some("Welcome!"));

        assert!(db.channel_bots().unassign("#rust").await.unwrap());
        assert!(db.channel_bots().for_channel("#rust").await.unwrap().is_none());
    }
}
