//! Virtual-host repository (HostServ backing store).

use sqlx::SqlitePool;

use super::DbError;

/// Vhost request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VhostStatus {
    Pending,
    Approved,
    Rejected,
}

impl VhostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VhostStatus::Pending => "pending",
            VhostStatus::Approved => "approved",
            VhostStatus::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "approved" => VhostStatus::Approved,
            "rejected" => VhostStatus::Rejected,
            _ => VhostStatus::Pending,
        }
    }
}

/// A virtual host record.
#[derive(Debug, Clone)]
pub struct VirtualHost {
    pub id: i64,
    pub account_id: i64,
    pub vhost: String,
    pub status: VhostStatus,
    pub requested_at: i64,
    pub actioned_at: Option<i64>,
}

type VhostRow = (i64, i64, String, String, i64, Option<i64>);

fn from_row((id, account_id, vhost, status, requested_at, actioned_at): VhostRow) -> VirtualHost {
    VirtualHost {
        id,
        account_id,
        vhost,
        status: VhostStatus::parse(&status),
        requested_at,
        actioned_at,
    }
}

const COLS: &str = "id, account_id, vhost, status, requested_at, actioned_at";

/// Repository for virtual hosts.
pub struct VirtualHostRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> VirtualHostRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn request(&self, account_id: i64, vhost: &str) -> Result<VirtualHost, DbError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO vhosts (account_id, vhost, status, requested_at) VALUES (?, ?, 'pending', ?)",
        )
        .bind(account_id)
        .bind(vhost)
        .bind(now)
        .execute(self.pool)
        .await?;
        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<VirtualHost>, DbError> {
        let row = sqlx::query_as::<_, VhostRow>(&format!("SELECT {COLS} FROM vhosts WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(from_row))
    }

    pub async fn for_account(&self, account_id: i64) -> Result<Vec<VirtualHost>, DbError> {
        let rows = sqlx::query_as::<_, VhostRow>(&format!(
            "SELECT {COLS} FROM vhosts WHERE account_id = ? ORDER BY id"
        ))
        .bind(account_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// The approved vhost for an account, most recent first.
    pub async fn approved_for(&self, account_id: i64) -> Result<Option<VirtualHost>, DbError> {
        let row = sqlx::query_as::<_, VhostRow>(&format!(
            "SELECT {COLS} FROM vhosts WHERE account_id = ? AND status = 'approved' \
             ORDER BY actioned_at DESC LIMIT 1"
        ))
        .bind(account_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    /// All pending requests (HostServ WAITING).
    pub async fn get_pending(&self) -> Result<Vec<VirtualHost>, DbError> {
        let rows = sqlx::query_as::<_, VhostRow>(&format!(
            "SELECT {COLS} FROM vhosts WHERE status = 'pending' ORDER BY requested_at"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn set_status(&self, id: i64, status: VhostStatus) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE vhosts SET status = ?, actioned_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM vhosts WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::VhostStatus;
    use crate::db::Database;

    #[tokio::test]
    async fn request_approve_flow() {
        let db = Database::new(":memory:").await.unwrap();
        let alice = db.accounts().register("alice", "pw", None).await.unwrap();

        let vhost = db.vhosts().request(alice.id, "staff/alice").await.unwrap();
        assert_eq!(vhost.status, VhostStatus::Pending);
        assert_eq!(db.vhosts().get_pending().await.unwrap().len(), 1);
        assert!(db.vhosts().approved_for(alice.id).await.unwrap().is_none());

        db.vhosts()
            .set_status(vhost.id, VhostStatus::Approved)
            .await
            .unwrap();
        assert!(db.vhosts().get_pending().await.unwrap().is_empty());
        let approved = db.vhosts().approved_for(alice.id).await.unwrap().unwrap();
        assert_eq!(approved.vhost, "staff/alice");

        assert!(db.vhosts().delete(vhost.id).await.unwrap());
    }
}
