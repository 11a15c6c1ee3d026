//! Scheduled cleanup of idle sessions and expired refresh tokens.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::db::{Database, unix_now};
use crate::scheduler::{JobError, Scheduler};

/// Sessions idle for longer than this are deactivated: 2 weeks
pub const SESSION_RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Default interval between session sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval between expired refresh token cleanups.
const REFRESH_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Active sessions found past the cutoff.
    pub stale: usize,
    /// Sessions successfully set inactive.
    pub deactivated: usize,
    /// Sessions whose update failed; left for the next sweep.
    pub failed: usize,
}

#[derive(Debug)]
pub enum SweepError {
    /// Another sweep holds the single-flight lock.
    AlreadyRunning,
    /// Selecting stale sessions failed.
    Database(sqlx::Error),
}

impl std::fmt::Display for SweepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepError::AlreadyRunning => write!(f, "A session sweep is already running"),
            SweepError::Database(e) => write!(f, "Failed to select stale sessions: {}", e),
        }
    }
}

impl std::error::Error for SweepError {}

/// Deactivate active sessions whose last update is older than `now - retention`.
///
/// Each record is updated on its own. A failed update is logged and counted
/// and does not stop the others.
pub async fn deactivate_stale_sessions(
    db: &Database,
    now: i64,
    retention: Duration,
) -> Result<SweepReport, sqlx::Error> {
    let retention = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    let cutoff = now.saturating_sub(retention);
    let stale = db.sessions().list_stale_active(cutoff).await?;

    let mut report = SweepReport {
        stale: stale.len(),
        ..SweepReport::default()
    };

    for record in stale {
        match db.sessions().deactivate(&record.session_id).await {
            Ok(true) => report.deactivated += 1,
            // Deactivated by a logout in the meantime
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                warn!(
                    session_id = %record.session_id,
                    user_id = record.user_id,
                    error = %e,
                    "Failed to deactivate session"
                );
            }
        }
    }

    info!(
        stale = report.stale,
        deactivated = report.deactivated,
        failed = report.failed,
        "Session sweep finished"
    );

    Ok(report)
}

/// Session sweep shared by the scheduled job and the manual trigger.
/// At most one sweep runs at a time.
#[derive(Clone)]
pub struct SessionSweeper {
    db: Database,
    retention: Duration,
    in_flight: Arc<Mutex<()>>,
}

impl SessionSweeper {
    pub fn new(db: Database, retention: Duration) -> Self {
        Self {
            db,
            retention,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Run a sweep now, unless one is already running.
    pub async fn run(&self) -> Result<SweepReport, SweepError> {
        let _lock = self
            .in_flight
            .try_lock()
            .map_err(|_| SweepError::AlreadyRunning)?;

        deactivate_stale_sessions(&self.db, unix_now(), self.retention)
            .await
            .map_err(SweepError::Database)
    }
}

/// Delete refresh tokens past their expiry.
pub async fn purge_expired_refresh_tokens(db: &Database) {
    match db.refresh_tokens().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired refresh tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired refresh tokens: {}", e),
    }
}

/// Build the background scheduler with the session sweep and refresh token cleanup.
pub fn cleanup_scheduler(
    db: Database,
    sweeper: SessionSweeper,
    sweep_interval: Duration,
) -> Scheduler {
    Scheduler::new()
        .every("session-sweep", sweep_interval, move || {
            let sweeper = sweeper.clone();
            async move {
                match sweeper.run().await {
                    Ok(_) => Ok(()),
                    Err(SweepError::AlreadyRunning) => {
                        info!("Manual session sweep in progress, skipping scheduled run");
                        Ok(())
                    }
                    Err(e) => Err(JobError::from(e)),
                }
            }
        })
        .every("refresh-token-cleanup", REFRESH_CLEANUP_INTERVAL, move || {
            let db = db.clone();
            async move {
                purge_expired_refresh_tokens(&db).await;
                Ok(())
            }
        })
}
