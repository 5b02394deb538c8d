// Job handlers, dispatched by queue job name.
// Aggregation jobs advance one granularity's chain; audit jobs backfill a past range.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::aggregator::{StatsAggregator, aggregate_if_missing};
use crate::auditor::Auditor;
use crate::error::JobError;
use crate::models::{AUDIT_JOB, AggregationJobPayload, AuditJobPayload, Granularity};
use crate::queue::{JobQueue, QueuedJob};
use crate::task::{RunOutcome, Task};

/// Collaborators shared by every running job.
pub struct JobContext {
    pub queue: Arc<dyn JobQueue>,
    pub aggregator: Arc<dyn StatsAggregator>,
    pub auditor: Arc<Auditor>,
}

/// How a handler finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Stopped by shutdown before finishing. The job stays active and is recovered on restart.
    Interrupted,
}

#[instrument(skip(ctx, job), fields(job_id = job.id, job = %job.name))]
pub async fn perform(ctx: &JobContext, job: &QueuedJob) -> anyhow::Result<JobOutcome> {
    if job.name == AUDIT_JOB {
        return perform_audit(ctx, job).await;
    }
    match Granularity::from_job_name(&job.name) {
        Some(granularity) => perform_aggregation(ctx, job, granularity).await,
        None => Err(JobError::UnknownJob(job.name.clone()).into()),
    }
}

async fn perform_aggregation(
    ctx: &JobContext,
    job: &QueuedJob,
    granularity: Granularity,
) -> anyhow::Result<JobOutcome> {
    let payload: AggregationJobPayload = job.payload_as()?;
    let mut task = Task::from_payload(&payload)?;
    if task.granularity() != granularity {
        return Err(JobError::GranularityMismatch {
            job: job.name.clone(),
            kind: payload.kind,
        }
        .into());
    }

    let aggregator = ctx.aggregator.as_ref();
    let name = task.name();
    let outcome = task
        .run_continuous(ctx.queue.as_ref(), Utc::now(), |partition| {
            aggregate_if_missing(aggregator, name, partition)
        })
        .await?;

    match outcome {
        RunOutcome::Advanced { next, delay } => debug!(
            task = name,
            next = %next,
            delay_ms = delay.as_millis() as u64,
            "chain advanced"
        ),
        RunOutcome::Rescheduled { partition, delay } => debug!(
            task = name,
            partition = %partition,
            delay_ms = delay.as_millis() as u64,
            "chain rescheduled"
        ),
    }
    Ok(JobOutcome::Completed)
}

async fn perform_audit(ctx: &JobContext, job: &QueuedJob) -> anyhow::Result<JobOutcome> {
    let payload: AuditJobPayload = job.payload_as()?;
    let granularity = Granularity::try_from(payload.kind)?;
    info!(%granularity, from = %payload.from, to = %payload.to, "audit job started");

    let report = ctx
        .auditor
        .audit(payload.from, payload.to, granularity, true)
        .await;
    if report.cancelled {
        return Ok(JobOutcome::Interrupted);
    }
    Ok(JobOutcome::Completed)
}
