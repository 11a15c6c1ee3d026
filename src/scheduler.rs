//! Periodic background jobs on a single timing driver.
//!
//! Each job fires at its own period. A run executes in its own task; its
//! error or panic is logged and never stops the driver. A job that is still
//! running when its next tick comes due is skipped for that tick.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Error type returned by scheduled jobs.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Longest accepted period. Longer periods are clamped so due times never
/// overflow `Instant`.
const MAX_PERIOD: Duration = Duration::from_secs(86400 * 365 * 30);

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

struct Job {
    name: &'static str,
    period: Duration,
    task: JobFn,
    running: Arc<AtomicBool>,
}

/// Resets a job's running flag when its run ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Job {
    fn fire(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(job = self.name, "Previous run still in progress, skipping");
            return;
        }

        let guard = RunningGuard(self.running.clone());
        let name = self.name;
        let run = (self.task)();

        tokio::spawn(async move {
            let _guard = guard;
            match tokio::spawn(run).await {
                Ok(Ok(())) => debug!(job = name, "Scheduled job finished"),
                Ok(Err(e)) => error!(job = name, error = %e, "Scheduled job failed"),
                Err(e) if e.is_panic() => error!(job = name, "Scheduled job panicked"),
                Err(_) => warn!(job = name, "Scheduled job was cancelled"),
            }
        });
    }
}

/// Builder and driver for periodic jobs.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job that runs immediately on start and then every `period`.
    pub fn every<F, Fut>(mut self, name: &'static str, period: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.jobs.push(Job {
            name,
            period: period.clamp(Duration::from_millis(1), MAX_PERIOD),
            task: Arc::new(move || task().boxed()),
            running: Arc::new(AtomicBool::new(false)),
        });
        self
    }

    /// Spawn the driver. Abort the returned handle to stop scheduling.
    /// Runs already in flight finish on their own.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.drive())
    }

    async fn drive(self) {
        let start = Instant::now();
        let mut next_due = vec![start; self.jobs.len()];

        loop {
            let Some(&wake) = next_due.iter().min() else {
                return;
            };
            tokio::time::sleep_until(wake).await;

            let now = Instant::now();
            for (job, due) in self.jobs.iter().zip(next_due.iter_mut()) {
                if *due <= now {
                    job.fire();
                    // Missed ticks are dropped rather than replayed.
                    while *due <= now {
                        *due += job.period;
                    }
                }
            }
        }
    }
}
