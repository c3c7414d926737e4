//! SQLite account repository implementation.
//!
//! Implements `AccountRepository` from `parley-core`. Tokens are stored by
//! hash only; the plaintext never reaches this layer.

use chrono::{DateTime, Utc};
use parley_core::repository::account::AccountRepository;
use parley_types::error::RepositoryError;
use parley_types::user::{Account, AccountSummary, UserId};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `AccountRepository`.
pub struct SqliteAccountRepository {
    pool: DatabasePool,
}

impl SqliteAccountRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn parse_user_id(s: &str) -> Result<UserId, RepositoryError> {
    UserId::parse(s).map_err(|e| RepositoryError::Query(format!("invalid user id: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl AccountRepository for SqliteAccountRepository {
    async fn create_account(&self, account: &Account) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO accounts (user_id, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(account.user_id.as_str())
        .bind(&account.password_hash)
        .bind(format_datetime(&account.created_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("user '{}' already exists", account.user_id)),
            ),
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let user_id: String = row
                    .try_get("user_id")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let password_hash: String = row
                    .try_get("password_hash")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let created_at: String = row
                    .try_get("created_at")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(Account {
                    user_id: parse_user_id(&user_id)?,
                    password_hash,
                    created_at: parse_datetime(&created_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT a.user_id, a.created_at, COUNT(t.token_hash) AS active_tokens
               FROM accounts a
               LEFT JOIN auth_tokens t ON t.user_id = a.user_id
               GROUP BY a.user_id, a.created_at
               ORDER BY a.user_id ASC"#,
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let user_id: String = row
                .try_get("user_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let created_at: String = row
                .try_get("created_at")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let active_tokens: i64 = row
                .try_get("active_tokens")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            summaries.push(AccountSummary {
                user_id: parse_user_id(&user_id)?,
                created_at: parse_datetime(&created_at)?,
                active_tokens: active_tokens as u32,
            });
        }
        Ok(summaries)
    }

    async fn save_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO auth_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)")
            .bind(token_hash)
            .bind(user_id.as_str())
            .bind(format_datetime(&created_at))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> Result<Option<UserId>, RepositoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM auth_tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|(user_id,)| parse_user_id(&user_id)).transpose()
    }

    async fn touch_token(
        &self,
        token_hash: &str,
        used_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE auth_tokens SET last_used_at = ? WHERE token_hash = ?")
            .bind(format_datetime(&used_at))
            .bind(token_hash)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn revoke_token(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
