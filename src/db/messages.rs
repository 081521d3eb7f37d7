//! Message history repository (CHATHISTORY backing store).

use sqlx::SqlitePool;

use super::DbError;

/// A stored channel or private message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub msgid: String,
    /// Channel name or lowercase nickname.
    pub target: String,
    /// Sender mask (`nick!user@host`).
    pub sender: String,
    pub account: Option<String>,
    /// `PRIVMSG` or `NOTICE`.
    pub kind: String,
    pub body: String,
    pub sent_at: i64,
}

type MessageRow = (i64, String, String, String, Option<String>, String, String, i64);

fn from_row((id, msgid, target, sender, account, kind, body, sent_at): MessageRow) -> StoredMessage {
    StoredMessage {
        id,
        msgid,
        target,
        sender,
        account,
        kind,
        body,
        sent_at,
    }
}

const COLS: &str = "id, msgid, target, sender, account, kind, body, sent_at";

/// Repository for message history.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn store(&self, msg: &StoredMessage) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO messages (msgid, target, sender, account, kind, body, sent_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&msg.msgid)
        .bind(&msg.target)
        .bind(&msg.sender)
        .bind(&msg.account)
        .bind(&msg.kind)
        .bind(&msg.body)
        .bind(msg.sent_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// The `limit` most recent messages for a target, oldest first.
    pub async fn get_latest(&self, target: &str, limit: i64) -> Result<Vec<StoredMessage>, DbError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLS} FROM (SELECT {COLS} FROM messages WHERE target = ? \
             ORDER BY sent_at DESC, id DESC LIMIT ?) ORDER BY sent_at, id"
        ))
        .bind(target)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Messages before the given timestamp, newest-first window, returned
    /// oldest first.
    pub async fn get_before(
        &self,
        target: &str,
        before: i64,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, DbError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLS} FROM (SELECT {COLS} FROM messages WHERE target = ? AND sent_at < ? \
             ORDER BY sent_at DESC, id DESC LIMIT ?) ORDER BY sent_at, id"
        ))
        .bind(target)
        .bind(before)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Messages after the given timestamp, oldest first.
    pub async fn get_after(
        &self,
        target: &str,
        after: i64,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, DbError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLS} FROM messages WHERE target = ? AND sent_at > ? \
             ORDER BY sent_at, id LIMIT ?"
        ))
        .bind(target)
        .bind(after)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Messages between two timestamps (exclusive), oldest first.
    pub async fn get_between(
        &self,
        target: &str,
        from: i64,
        to: i64,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, DbError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLS} FROM messages WHERE target = ? AND sent_at > ? AND sent_at < ? \
             ORDER BY sent_at, id LIMIT ?"
        ))
        .bind(target)
        .bind(from.min(to))
        .bind(from.max(to))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Messages surrounding a message id, oldest first.
    pub async fn get_around(
        &self,
        target: &str,
        msgid: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, DbError> {
        let anchor = sqlx::query_scalar::<_, i64>(
            "SELECT sent_at FROM messages WHERE target = ? AND msgid = ?",
        )
        .bind(target)
        .bind(msgid)
        .fetch_optional(self.pool)
        .await?;
        let Some(anchor) = anchor else {
            return Ok(Vec::new());
        };
        let half = (limit / 2).max(1);
        let mut before = self.get_before(target, anchor, half).await?;
        let after = self.get_after(target, anchor - 1, half + 1).await?;
        before.extend(after);
        before.dedup_by(|a, b| a.id == b.id);
        Ok(before)
    }

    /// Delete messages older than `cutoff`; returns how many went away.
    pub async fn prune_before(&self, cutoff: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM messages WHERE sent_at < ?")
            .bind(cutoff)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn msg(msgid: &str, target: &str, sent_at: i64) -> StoredMessage {
        StoredMessage {
            id: 0,
            msgid: msgid.to_string(),
            target: target.to_string(),
            sender: "alice!a@h".to_string(),
            account: Some("alice".to_string()),
            kind: "PRIVMSG".to_string(),
            body: format!("message {msgid}"),
            sent_at,
        }
    }

    #[tokio::test]
    async fn latest_window_is_oldest_first() {
        let db = Database::new(":memory:").await.unwrap();
        for i in 0..5 {
            db.messages().store(&msg(&format!("m{i}"), "#a", 100 + i)).await.unwrap();
        }
        let latest = db.messages().get_latest("#a", 3).await.unwrap();
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].msgid, "m2");
        assert_eq!(latest[2].msgid, "m4");
    }

    #[tokio::test]
    async fn before_after_between() {
        let db = Database::new(":memory:").await.unwrap();
        for i in 0..5 {
            db.messages().store(&msg(&format!("m{i}"), "#a", 100 + i)).await.unwrap();
        }
        let before = db.messages().get_before("#a", 103, 10).await.unwrap();
        assert_eq!(before.last().unwrap().msgid, "m2");

        let after = db.messages().get_after("#a", 102, 10).await.unwrap();
        assert_eq!(after.first().unwrap().msgid, "m3");

        let between = db.messages().get_between("#a", 100, 104, 10).await.unwrap();
        assert_eq!(between.len(), 3);
    }

    #[tokio::test]
    async fn around_anchors_on_msgid() {
        let db = Database::new(":memory:").await.unwrap();
        for i in 0..5 {
            db.messages().store(&msg(&format!("m{i}"), "#a", 100 + i)).await.unwrap();
        }
        let around = db.messages().get_around("#a", "m2", 4).await.unwrap();
        assert!(around.iter().any(|m| m.msgid == "m2"));
        assert!(db.messages().get_around("#a", "nope", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn targets_are_isolated() {
        let db = Database::new(":memory:").await.unwrap();
        db.messages().store(&msg("m1", "#a", 100)).await.unwrap();
        db.messages().store(&msg("m2", "#b", 100)).await.unwrap();
        assert_eq!(db.messages().get_latest("#a", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_removes_old_rows() {
        let db = Database::new(":memory:").await.unwrap();
        db.messages().store(&msg("m1", "#a", 100)).await.unwrap();
        db.messages().store(&msg("m2", "#a", 200)).await.unwrap();
        assert_eq!(db.messages().prune_before(150).await.unwrap(), 1);
    }
}
