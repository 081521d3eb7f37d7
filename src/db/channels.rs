//! Registered-channel repository (ChanServ backing store).

use sqlx::SqlitePool;

use super::DbError;

/// A ChanServ channel registration.
#[derive(Debug, Clone)]
pub struct RegisteredChannel {
    pub id: i64,
    pub name: String,
    pub founder_account_id: i64,
    pub successor_account_id: Option<i64>,
    /// Topic restored on channel creation when keep_topic is set.
    pub topic: Option<String>,
    pub keep_topic: bool,
    /// When set, only identified users may gain channel operator status.
    pub secure: bool,
    pub registered_at: i64,
}

type ChannelRow = (i64, String, i64, Option<i64>, Option<String>, bool, bool, i64);

fn from_row(
    (id, name, founder_account_id, successor_account_id, topic, keep_topic, secure, registered_at): ChannelRow,
) -> RegisteredChannel {
    RegisteredChannel {
        id,
        name,
        founder_account_id,
        successor_account_id,
        topic,
        keep_topic,
        secure,
        registered_at,
    }
}

const COLS: &str = "id, name, founder_account_id, successor_account_id, topic, keep_topic, secure, registered_at";

/// Repository for channel registrations.
pub struct RegisteredChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RegisteredChannelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, name: &str, founder_account_id: i64) -> Result<RegisteredChannel, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO registered_channels (name, founder_account_id, registered_at) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(founder_account_id)
        .bind(now)
        .execute(self.pool)
        .await;

        match result {
            Ok(_) => self
                .find_by_name(name)
                .await?
                .ok_or(DbError::NotFound),
            Err(e) if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) => {
                Err(DbError::ChannelExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<RegisteredChannel>, DbError> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {COLS} FROM registered_channels WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<RegisteredChannel>, DbError> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {COLS} FROM registered_channels WHERE name = ? COLLATE NOCASE"
        ))
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn all(&self) -> Result<Vec<RegisteredChannel>, DbError> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {COLS} FROM registered_channels ORDER BY name"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn set_founder(&self, id: i64, account_id: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE registered_channels SET founder_account_id = ? WHERE id = ?")
            .bind(account_id)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_successor(&self, id: i64, account_id: Option<i64>) -> Result<(), DbError> {
        sqlx::query("UPDATE registered_channels SET successor_account_id = ? WHERE id = ?")
            .bind(account_id)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_keep_topic(&self, id: i64, keep: bool) -> Result<(), DbError> {
        sqlx::query("UPDATE registered_channels SET keep_topic = ? WHERE id = ?")
            .bind(keep)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_secure(&self, id: i64, secure: bool) -> Result<(), DbError> {
        sqlx::query("UPDATE registered_channels SET secure = ? WHERE id = ?")
            .bind(secure)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_topic(&self, id: i64, topic: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE registered_channels SET topic = ? WHERE id = ?")
            .bind(topic)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn drop_registration(&self, id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM registered_channels WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, DbError};

    #[tokio::test]
    async fn register_lookup_drop() {
        let db = Database::new(":memory:").await.unwrap();
        let founder = db.accounts().register("alice", "pw", None).await.unwrap();

        let chan = db.channels().register("#rust", founder.id).await.unwrap();
        assert_eq!(chan.name, "#rust");
        assert!(!chan.keep_topic);

        let err = db.channels().register("#RUST", founder.id).await.unwrap_err();
        assert!(matches!(err, DbError::ChannelExists(_)));

        db.channels().set_keep_topic(chan.id, true).await.unwrap();
        db.channels().set_secure(chan.id, true).await.unwrap();
        let reloaded = db.channels().find_by_name("#rust").await.unwrap().unwrap();
        assert!(reloaded.keep_topic);
        assert!(reloaded.secure);

        db.channels().drop_registration(chan.id).await.unwrap();
        assert!(db.channels().find_by_name("#rust").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn successor_round_trip() {
        let db = Database::new(":memory:").await.unwrap();
        let founder = db.accounts().register("alice", "pw", None).await.unwrap();
        let successor = db.accounts().register("bob", "pw", None).await.unwrap();
        let chan = db.channels().register("#ops", founder.id).await.unwrap();
        db.channels()
            .set_successor(chan.id, Some(successor.id))
            .await
            .unwrap();
        let reloaded = db.channels().get_by_id(chan.id).await.unwrap().unwrap();
        assert_eq!(reloaded.successor_account_id, Some(successor.id));
    }
}
