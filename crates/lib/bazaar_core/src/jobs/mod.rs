//! Periodic background jobs.

pub mod cleanup;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use cleanup::RefreshTokenCleanupJob;

use crate::error::DomainError;

#[derive(Debug, Error)]
pub enum JobError {
    /// Lost a race with a concurrent writer; the next tick tries again.
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    #[error("Job failed: {0}")]
    Failed(#[from] DomainError),
}

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<(), JobError>;
}

/// Run `job` every `period` until `shutdown` is cancelled.
///
/// The first run happens one period after start. Failures are logged and the
/// schedule continues.
pub fn spawn_job(
    job: Arc<dyn ScheduledJob>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = job.name(), period_secs = period.as_secs(), "Scheduled job");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(job = job.name(), "Job stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match job.run().await {
                        Ok(()) => {}
                        Err(JobError::Conflict(msg)) => {
                            warn!(job = job.name(), %msg, "Job hit a conflict, retrying next tick");
                        }
                        Err(e) => error!(job = job.name(), error = %e, "Job failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<(), JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(JobError::Conflict("busy".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_every_period_until_cancelled() {
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            fail: true,
        });
        let shutdown = CancellationToken::new();
        let handle = spawn_job(job.clone(), Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }
}
