// Job worker: polls the queue for due jobs and runs them on a bounded JoinSet.
// Finished jobs are removed, failed ones marked failed; interrupted ones are left active.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::jobs::{self, JobContext, JobOutcome};
use crate::queue::QueuedJob;
use crate::shutdown::{self, ShutdownRx};

/// Worker timing and concurrency.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub max_concurrent_jobs: usize,
}

/// Spawns the poll loop. Returns once shutdown was signalled and in-flight jobs have finished.
pub fn spawn(
    ctx: Arc<JobContext>,
    config: WorkerConfig,
    mut shutdown_rx: ShutdownRx,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut poll = interval(Duration::from_millis(config.poll_interval_ms.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let max_concurrent = config.max_concurrent_jobs.max(1);
        let mut running: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = poll.tick() => {}
                Some(res) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = res {
                        tracing::error!(error = %e, "job task panicked");
                    }
                    continue;
                }
                _ = shutdown::wait(&mut shutdown_rx) => break,
            }

            while running.len() < max_concurrent {
                match ctx.queue.claim_due(Utc::now()).await {
                    Ok(Some(job)) => {
                        let ctx = ctx.clone();
                        running.spawn(async move { run_job(&ctx, job).await });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "worker: claim_due failed");
                        break;
                    }
                }
            }
        }

        tracing::debug!(in_flight = running.len(), "worker draining");
        while let Some(res) = running.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "job task panicked");
            }
        }
        tracing::debug!("worker shutting down");
    })
}

/// Runs one claimed job and records the result in the queue.
pub async fn run_job(ctx: &JobContext, job: QueuedJob) {
    let id = job.id;
    let result = match jobs::perform(ctx, &job).await {
        Ok(JobOutcome::Completed) => ctx.queue.complete(id).await,
        Ok(JobOutcome::Interrupted) => {
            tracing::info!(job_id = id, job = %job.name, "job interrupted, left for recovery");
            Ok(())
        }
        Err(e) => {
            tracing::error!(job_id = id, job = %job.name, error = %format!("{e:#}"), "job failed");
            ctx.queue.fail(id, &format!("{e:#}")).await
        }
    };
    if let Err(e) = result {
        tracing::warn!(job_id = id, error = %e, "worker: queue update failed");
    }
}
