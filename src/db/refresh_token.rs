//! Refresh token storage keyed by user.
//!
//! Holds at most one refresh token per user. Presence of a live row is what
//! keeps a session alive: deleting it (logout, ban) revokes the session even
//! if the token itself has not expired. Access tokens are never stored.

use sqlx::sqlite::SqlitePool;
use std::time::Duration;

use super::unix_now;

/// Store mapping a user ID to its current refresh token.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store the refresh token for a user, replacing any previous one.
    pub async fn put(&self, user_id: i64, token: &str, ttl: Duration) -> Result<(), sqlx::Error> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = unix_now().saturating_add(ttl);

        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET token = excluded.token, expires_at = excluded.expires_at",
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the live refresh token for a user. Expired entries read as absent.
    pub async fn get(&self, user_id: i64) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT token FROM refresh_tokens WHERE user_id = ? AND expires_at > ?")
                .bind(user_id)
                .bind(unix_now())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// Delete the refresh token for a user (revoke the session).
    pub async fn delete(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all expired entries.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(unix_now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
