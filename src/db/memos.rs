//! Memo repository (MemoServ backing store).

use sqlx::SqlitePool;

use super::DbError;

/// A stored memo.
#[derive(Debug, Clone)]
pub struct Memo {
    pub id: i64,
    pub recipient_account_id: i64,
    pub sender: String,
    pub body: String,
    pub sent_at: i64,
    pub unread: bool,
}

type MemoRow = (i64, i64, String, String, i64, bool);

fn from_row((id, recipient_account_id, sender, body, sent_at, unread): MemoRow) -> Memo {
    Memo {
        id,
        recipient_account_id,
        sender,
        body,
        sent_at,
        unread,
    }
}

const COLS: &str = "id, recipient_account_id, sender, body, sent_at, unread";

/// Repository for memos.
pub struct MemoRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MemoRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn send(
        &self,
        recipient_account_id: i64,
        sender: &str,
        body: &str,
    ) -> Result<Memo, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO memos (recipient_account_id, sender, body, sent_at, unread) \
             VALUES (?, ?, ?, ?, 1)",
        )
        .bind(recipient_account_id)
        .bind(sender)
        .bind(body)
        .bind(now)
        .execute(self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Memo>, DbError> {
        let row = sqlx::query_as::<_, MemoRow>(&format!("SELECT {COLS} FROM memos WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(from_row))
    }

    /// All memos for an account, oldest first (stable list numbering).
    pub async fn list_for(&self, account_id: i64) -> Result<Vec<Memo>, DbError> {
        let rows = sqlx::query_as::<_, MemoRow>(&format!(
            "SELECT {COLS} FROM memos WHERE recipient_account_id = ? ORDER BY id"
        ))
        .bind(account_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn unread_count(&self, account_id: i64) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM memos WHERE recipient_account_id = ? AND unread = 1",
        )
        .bind(account_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    pub async fn mark_read(&self, id: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE memos SET unread = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM memos WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_for(&self, account_id: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM memos WHERE recipient_account_id = ?")
            .bind(account_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn memo_round_trip() {
        let db = Database::new(":memory:").await.unwrap();
        let bob = db.accounts().register("bob", "pw", None).await.unwrap();

        let memo = db.memos().send(bob.id, "alice", "Hello").await.unwrap();
        assert!(memo.unread);
        assert_eq!(db.memos().unread_count(bob.id).await.unwrap(), 1);

        db.memos().mark_read(memo.id).await.unwrap();
        assert_eq!(db.memos().unread_count(bob.id).await.unwrap(), 0);
        let listed = db.memos().list_for(bob.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].unread);

        assert!(db.memos().delete(memo.id).await.unwrap());
        assert!(!db.memos().delete(memo.id).await.unwrap());
    }

    #[tokio::test]
    async fn clear_removes_all() {
        let db = Database::new(":memory:").await.unwrap();
        let bob = db.accounts().register("bob", "pw", None).await.unwrap();
        for i in 0..3 {
            db.memos()
                .send(bob.id, "alice", &format!("memo {i}"))
                .await
                .unwrap();
        }
        assert_eq!(db.memos().clear_for(bob.id).await.unwrap(), 3);
        assert!(db.memos().list_for(bob.id).await.unwrap().is_empty());
    }
}
