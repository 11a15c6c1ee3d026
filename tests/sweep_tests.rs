//! Tests for the idle session sweep and the cleanup scheduler.

use std::time::Duration;
use tourgate::db::{Database, SessionStatus, unix_now};
use tourgate::sweep::{
    SESSION_RETENTION, SessionSweeper, cleanup_scheduler, deactivate_stale_sessions,
};

const DAY: i64 = 24 * 60 * 60;

async fn status(db: &Database, session_id: &str) -> SessionStatus {
    db.sessions()
        .get(session_id)
        .await
        .unwrap()
        .expect("session exists")
        .status
}

/// Five sessions idle for 15+ days and three updated within the last week.
async fn seed(db: &Database) -> (Vec<String>, Vec<String>) {
    let now = unix_now();
    let mut stale = Vec::new();
    for i in 0..5 {
        stale.push(db.sessions().create(i, now - (15 + i) * DAY).await.unwrap());
    }
    let mut fresh = Vec::new();
    for i in 0..3 {
        fresh.push(db.sessions().create(10 + i, now - (i + 1) * DAY).await.unwrap());
    }
    (stale, fresh)
}

#[tokio::test]
async fn test_sweep_deactivates_only_stale_sessions() {
    let db = Database::open(":memory:").await.unwrap();
    let (stale, fresh) = seed(&db).await;

    let report = deactivate_stale_sessions(&db, unix_now(), SESSION_RETENTION)
        .await
        .unwrap();

    assert_eq!(report.stale, 5);
    assert_eq!(report.deactivated, 5);
    assert_eq!(report.failed, 0);
    for id in &stale {
        assert_eq!(status(&db, id).await, SessionStatus::Inactive);
    }
    for id in &fresh {
        assert_eq!(status(&db, id).await, SessionStatus::Active);
    }
}

#[tokio::test]
async fn test_sweep_boundary_is_strict() {
    let db = Database::open(":memory:").await.unwrap();
    let now = unix_now();
    let retention = SESSION_RETENTION.as_secs() as i64;
    let at_cutoff = db.sessions().create(1, now - retention).await.unwrap();
    let past_cutoff = db.sessions().create(2, now - retention - 1).await.unwrap();

    let report = deactivate_stale_sessions(&db, now, SESSION_RETENTION)
        .await
        .unwrap();

    assert_eq!(report.deactivated, 1);
    assert_eq!(status(&db, &at_cutoff).await, SessionStatus::Active);
    assert_eq!(status(&db, &past_cutoff).await, SessionStatus::Inactive);
}

#[tokio::test]
async fn test_huge_retention_keeps_fresh_sessions() {
    let db = Database::open(":memory:").await.unwrap();
    let now = unix_now();
    let fresh = db.sessions().create(1, now).await.unwrap();
    let old = db.sessions().create(2, now - 3650 * DAY).await.unwrap();

    let sweeper = SessionSweeper::new(db.clone(), Duration::from_secs(u64::MAX));
    let report = sweeper.run().await.unwrap();

    assert_eq!(report.stale, 0);
    assert_eq!(status(&db, &fresh).await, SessionStatus::Active);
    assert_eq!(status(&db, &old).await, SessionStatus::Active);
}

#[tokio::test]
async fn test_sweep_skips_inactive_sessions() {
    let db = Database::open(":memory:").await.unwrap();
    let now = unix_now();
    db.sessions().create(1, now - 30 * DAY).await.unwrap();
    db.sessions().deactivate_by_user(1).await.unwrap();

    let report = deactivate_stale_sessions(&db, now, SESSION_RETENTION)
        .await
        .unwrap();

    assert_eq!(report.stale, 0);
    assert_eq!(report.deactivated, 0);
}

#[tokio::test]
async fn test_sweep_continues_past_failed_update() {
    let db = Database::open(":memory:").await.unwrap();
    let (stale, fresh) = seed(&db).await;
    let failing = &stale[2];

    sqlx::query(&format!(
        "CREATE TRIGGER fail_one BEFORE UPDATE OF status ON sessions
         WHEN OLD.session_id = '{}'
         BEGIN SELECT RAISE(ABORT, 'simulated failure'); END",
        failing
    ))
    .execute(db.pool())
    .await
    .unwrap();

    let report = deactivate_stale_sessions(&db, unix_now(), SESSION_RETENTION)
        .await
        .unwrap();

    assert_eq!(report.stale, 5);
    assert_eq!(report.deactivated, 4);
    assert_eq!(report.failed, 1);
    for id in &stale {
        let expected = if id == failing {
            SessionStatus::Active
        } else {
            SessionStatus::Inactive
        };
        assert_eq!(status(&db, id).await, expected);
    }
    for id in &fresh {
        assert_eq!(status(&db, id).await, SessionStatus::Active);
    }

    // The next sweep picks up what was left behind
    sqlx::query("DROP TRIGGER fail_one")
        .execute(db.pool())
        .await
        .unwrap();
    let report = deactivate_stale_sessions(&db, unix_now(), SESSION_RETENTION)
        .await
        .unwrap();
    assert_eq!(report.deactivated, 1);
    assert_eq!(status(&db, failing).await, SessionStatus::Inactive);
}

#[tokio::test]
async fn test_concurrent_manual_sweeps_are_single_flight() {
    let db = Database::open(":memory:").await.unwrap();
    seed(&db).await;
    let sweeper = SessionSweeper::new(db.clone(), SESSION_RETENTION);

    let (a, b) = tokio::join!(sweeper.run(), sweeper.run());

    // Either both ran one after the other, or one was turned away;
    // a session is never deactivated twice.
    let deactivated: usize = [a, b]
        .into_iter()
        .filter_map(Result::ok)
        .map(|report| report.deactivated)
        .sum();
    assert_eq!(deactivated, 5);
}

#[tokio::test]
async fn test_scheduler_sweeps_on_start() {
    let db = Database::open(":memory:").await.unwrap();
    let (stale, _) = seed(&db).await;

    let sweeper = SessionSweeper::new(db.clone(), SESSION_RETENTION);
    let handle = cleanup_scheduler(db.clone(), sweeper, Duration::from_secs(3600)).spawn();

    let mut swept = false;
    for _ in 0..100 {
        if status(&db, &stale[0]).await == SessionStatus::Inactive {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    assert!(swept, "scheduled sweep did not run");
}
