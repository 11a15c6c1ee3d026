//! Persisted session records.
//!
//! A session is opened at login and only ever deactivated, never deleted.
//! `update_time` is a unix timestamp refreshed by login and token renewal;
//! the lifecycle sweep uses it to find sessions that went idle.

use sqlx::sqlite::SqlitePool;

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Inactive,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => SessionStatus::Active,
            _ => SessionStatus::Inactive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: i64,
    pub status: SessionStatus,
    pub update_time: i64,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    user_id: i64,
    status: String,
    update_time: i64,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            user_id: row.user_id,
            status: SessionStatus::from_str(&row.status),
            update_time: row.update_time,
        }
    }
}

pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a new active session for a user. Returns the session ID.
    pub async fn create(&self, user_id: i64, now: i64) -> Result<String, sqlx::Error> {
        let session_id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, status, update_time) VALUES (?, ?, 'active', ?)",
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(session_id)
    }

    /// Get a session by ID.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT session_id, user_id, status, update_time FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRecord::from))
    }

    /// Refresh `update_time` on all active sessions of a user.
    pub async fn touch_active(&self, user_id: i64, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET update_time = ? WHERE user_id = ? AND status = 'active'",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deactivate all active sessions of a user (logout, ban).
    pub async fn deactivate_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'inactive' WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List active sessions whose `update_time` is strictly before `cutoff`.
    pub async fn list_stale_active(&self, cutoff: i64) -> Result<Vec<SessionRecord>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT session_id, user_id, status, update_time FROM sessions
             WHERE status = 'active' AND update_time < ? ORDER BY update_time",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    /// Deactivate a single session. Returns false if it was not active.
    pub async fn deactivate(&self, session_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'inactive' WHERE session_id = ? AND status = 'active'",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
