//! Server-ban repository.

use sqlx::SqlitePool;

use super::DbError;
use crate::security::{BanKind, ServerBan};

/// A persisted server ban row.
#[derive(Debug, Clone)]
pub struct ServerBanRecord {
    pub id: i64,
    pub ban: ServerBan,
}

type BanRow = (i64, String, String, String, String, i64, Option<i64>);

fn from_row((id, kind, mask, reason, set_by, set_at, expires_at): BanRow) -> Option<ServerBanRecord> {
    Some(ServerBanRecord {
        id,
        ban: ServerBan {
            kind: BanKind::from_str(&kind)?,
            mask,
            reason,
            set_by,
            set_at,
            expires_at,
        },
    })
}

fn kind_key(kind: BanKind) -> &'static str {
    match kind {
        BanKind::K => "K",
        BanKind::G => "G",
        BanKind::Z => "Z",
        BanKind::Jupe => "JUPE",
    }
}

const COLS: &str = "id, kind, mask, reason, set_by, set_at, expires_at";

/// Repository for server bans.
pub struct ServerBanRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ServerBanRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a ban of the same kind and mask.
    pub async fn add(&self, ban: &ServerBan) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO server_bans (kind, mask, reason, set_by, set_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (kind, mask) DO UPDATE SET \
               reason = excluded.reason, set_by = excluded.set_by, \
               set_at = excluded.set_at, expires_at = excluded.expires_at",
        )
        .bind(kind_key(ban.kind))
        .bind(&ban.mask)
        .bind(&ban.reason)
        .bind(&ban.set_by)
        .bind(ban.set_at)
        .bind(ban.expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, kind: BanKind, mask: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM server_bans WHERE kind = ? AND mask = ?")
            .bind(kind_key(kind))
            .bind(mask)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every unexpired ban, for warming the in-memory cache at boot.
    pub async fn get_active(&self) -> Result<Vec<ServerBan>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let rows = sqlx::query_as::<_, BanRow>(&format!(
            "SELECT {COLS} FROM server_bans WHERE expires_at IS NULL OR expires_at > ?"
        ))
        .bind(now)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(from_row)
            .map(|r| r.ban)
            .collect())
    }

    /// Active G-lines only (burst to new links).
    pub async fn get_active_glines(&self) -> Result<Vec<ServerBan>, DbError> {
        let now = chrono::Utc::now().timestamp();
        let rows = sqlx::query_as::<_, BanRow>(&format!(
            "SELECT {COLS} FROM server_bans WHERE kind = 'G' AND (expires_at IS NULL OR expires_at > ?)"
        ))
        .bind(now)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(from_row)
            .map(|r| r.ban)
            .collect())
    }

    /// Delete expired rows; returns how many were removed.
    pub async fn prune_expired(&self) -> Result<u64, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("DELETE FROM server_bans WHERE expires_at IS NOT NULL AND expires_at <= ?")
                .bind(now)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn gline(mask: &str, expires_at: Option<i64>) -> ServerBan {
        ServerBan {
            kind: BanKind::G,
            mask: mask.to_string(),
            reason: "spam".to_string(),
            set_by: "oper".to_string(),
            set_at: chrono::Utc::now().timestamp(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn add_list_remove() {
        let db = Database::new(":memory:").await.unwrap();
        db.bans().add(&gline("*@evil.example", None)).await.unwrap();
        assert_eq!(db.bans().get_active().await.unwrap().len(), 1);
        assert_eq!(db.bans().get_active_glines().await.unwrap().len(), 1);
        assert!(db.bans().remove(BanKind::G, "*@evil.example").await.unwrap());
        assert!(db.bans().get_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_same_mask() {
        let db = Database::new(":memory:").await.unwrap();
        db.bans().add(&gline("*@evil.example", None)).await.unwrap();
        let mut updated = gline("*@evil.example", None);
        updated.reason = "still spam".to_string();
        db.bans().add(&updated).await.unwrap();
        let active = db.bans().get_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].reason, "still spam");
    }

    #[tokio::test]
    async fn expired_pruned_and_hidden() {
        let db = Database::new(":memory:").await.unwrap();
        let past = chrono::Utc::now().timestamp() - 5;
        db.bans().add(&gline("*@old.example", Some(past))).await.unwrap();
        assert!(db.bans().get_active().await.unwrap().is_empty());
        assert_eq!(db.bans().prune_expired().await.unwrap(), 1);
    }
}
