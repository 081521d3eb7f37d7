//! Account repository (NickServ backing store).

use sqlx::SqlitePool;

use super::DbError;
use crate::security::password;

/// A registered account.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub registered_at: i64,
    pub last_seen_at: i64,
}

type AccountRow = (i64, String, Option<String>, i64, i64);

fn account_from_row((id, name, email, registered_at, last_seen_at): AccountRow) -> Account {
    Account {
        id,
        name,
        email,
        registered_at,
        last_seen_at,
    }
}

const ACCOUNT_COLS: &str = "id, name, email, registered_at, last_seen_at";

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new account. The UNIQUE constraint rejects duplicates,
    /// which also settles concurrent registrations of the same name.
    pub async fn register(
        &self,
        name: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<Account, DbError> {
        let password_hash = password::hash_password(password.to_string())
            .await
            .map_err(DbError::Internal)?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO accounts (name, password_hash, email, registered_at, last_seen_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(&password_hash)
        .bind(email)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await;

        match result {
            Ok(_) => self
                .find_by_name(name)
                .await?
                .ok_or_else(|| DbError::AccountNotFound(name.to_string())),
            Err(e) if is_unique_violation(&e) => Err(DbError::AccountExists(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Account>, DbError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(account_from_row))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Account>, DbError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLS} FROM accounts WHERE name = ? COLLATE NOCASE"
        ))
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(account_from_row))
    }

    /// Verify credentials, returning the account and bumping last-seen.
    pub async fn identify(&self, name: &str, pass: &str) -> Result<Account, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>, i64, i64)>(
            "SELECT id, name, password_hash, email, registered_at, last_seen_at \
             FROM accounts WHERE name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        let Some((id, name, password_hash, email, registered_at, last_seen_at)) = row else {
            // Burn a verification anyway so response timing does not
            // reveal whether the account exists.
            password::verify_password(pass.to_string(), dummy_hash()).await;
            return Err(DbError::AccountNotFound(name.to_string()));
        };

        if !password::verify_password(pass.to_string(), password_hash).await {
            return Err(DbError::InvalidPassword);
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE accounts SET last_seen_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(Account {
            id,
            name,
            email,
            registered_at,
            last_seen_at,
        })
    }

    /// Find the account bound to a TLS client-certificate fingerprint.
    pub async fn find_by_certfp(&self, certfp: &str) -> Result<Option<Account>, DbError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLS} FROM accounts WHERE certfp = ?"
        ))
        .bind(certfp)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(account_from_row))
    }

    /// Bind a certificate fingerprint to an account (SASL EXTERNAL).
    pub async fn bind_certfp(&self, name: &str, certfp: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE accounts SET certfp = ? WHERE name = ? COLLATE NOCASE")
            .bind(certfp)
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_email(&self, id: i64, email: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE accounts SET email = ? WHERE id = ?")
            .bind(email)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_password(&self, id: i64, new_password: &str) -> Result<(), DbError> {
        let hash = password::hash_password(new_password.to_string())
            .await
            .map_err(DbError::Internal)?;
        sqlx::query("UPDATE accounts SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Drop an account and everything keyed to it.
    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM memos WHERE recipient_account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM vhosts WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM registered_channels WHERE founder_account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn dummy_hash() -> String {
    // A valid argon2id hash of an unknowable password.
    "$argon2id$v=19$m=19456,t=2,p=1$MDEyMzQ1Njc4OWFiY2RlZg$S3kCT3dlc9+QxN1S5UQ1DT7oT1D3iO7z0Qn3Wq1S5UQ"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn register_and_identify() {
        let db = db().await;
        let account = db
            .accounts()
            .register("alice", "secret", Some("a@example.com"))
            .await
            .unwrap();
        assert_eq!(account.name, "alice");

        let found = db.accounts().identify("ALICE", "secret").await.unwrap();
        assert_eq!(found.id, account.id);

        let err = db.accounts().identify("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidPassword));
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let db = db().await;
        db.accounts().register("bob", "pw", None).await.unwrap();
        let err = db.accounts().register("BOB", "pw2", None).await.unwrap_err();
        assert!(matches!(err, DbError::AccountExists(_)));
    }

    #[tokio::test]
    async fn unknown_account_not_found() {
        let db = db().await;
        let err = db.accounts().identify("ghost", "pw").await.unwrap_err();
        assert!(matches!(err, DbError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn password_and_email_updates() {
        let db = db().await;
        let account = db.accounts().register("carol", "old", None).await.unwrap();
        db.accounts().set_password(account.id, "new").await.unwrap();
        assert!(db.accounts().identify("carol", "new").await.is_ok());
        db.accounts()
            .set_email(account.id, Some("c@example.com"))
            .await
            .unwrap();
        let reloaded = db.accounts().get_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.email.as_deref(), Some("c@example.com"));
    }

    #[tokio::test]
    async fn certfp_binding() {
        let db = db().await;
        db.accounts().register("erin", "pw", None).await.unwrap();
        db.accounts().bind_certfp("erin", "ab:cd:ef").await.unwrap();
        let found = db.accounts().find_by_certfp("ab:cd:ef").await.unwrap();
        assert_eq!(found.unwrap().name, "erin");
        assert!(db.accounts().find_by_certfp("no:pe").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_cascades() {
        let db = db().await;
        let account = db.accounts().register("dave", "pw", None).await.unwrap();
        db.accounts().delete(account.id).await.unwrap();
        assert!(db.accounts().find_by_name("dave").await.unwrap().is_none());
    }
}
