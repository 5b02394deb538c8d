// Per-granularity scheduling state machine.
// A closed window is aggregated and the next partition's job is enqueued; an open window
// (or a failed run) re-enqueues the same partition. A window is never skipped.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::models::{AggregationJobPayload, Granularity};
use crate::partition::Partition;
use crate::queue::{JobQueue, NewJob, Priority};

/// Delay used when re-enqueueing the same partition after its successor already started.
pub const RESCHEDULE_CATCH_UP: Duration = Duration::from_secs(60);

/// What a `run_continuous` call scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The window was aggregated; a job for `next` was enqueued after `delay`.
    Advanced { next: Partition, delay: Duration },
    /// The window is still open or the run failed; `partition` was enqueued again.
    Rescheduled { partition: Partition, delay: Duration },
}

/// Cursor over the partitions of one granularity.
/// Owned by a single job invocation or audit loop; never shared.
#[derive(Debug, Clone)]
pub struct Task {
    granularity: Granularity,
    current: Partition,
}

impl Task {
    pub fn new(granularity: Granularity, at: DateTime<Utc>) -> Self {
        Self {
            granularity,
            current: Partition::new(granularity, at),
        }
    }

    /// Rebuilds the task a job was enqueued for. Only `type` and `date` are used.
    pub fn from_payload(payload: &AggregationJobPayload) -> Result<Self, JobError> {
        let granularity = Granularity::try_from(payload.kind)?;
        Ok(Self::new(granularity, payload.date))
    }

    pub fn name(&self) -> &'static str {
        self.granularity.task_name()
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn current_partition(&self) -> Partition {
        self.current
    }

    pub fn next_partition(&self) -> Partition {
        self.current.increment()
    }

    pub fn last_partition(&self) -> Partition {
        self.current.decrement()
    }

    /// Partitions per parent unit; for days, the month of the next partition decides.
    pub fn partitions_amount(&self) -> u32 {
        match self.granularity {
            Granularity::Minute => 60,
            Granularity::Hour => 24,
            Granularity::Day => self.next_partition().days_in_month(),
            Granularity::Month => 12,
        }
    }

    /// When the next partition's aggregation is expected to have run.
    pub fn execution_time(&self) -> DateTime<Utc> {
        match self.granularity {
            Granularity::Minute => after(self.current.end(), TimeDelta::seconds(1)),
            Granularity::Hour | Granularity::Day | Granularity::Month => {
                after(self.next_partition().end(), TimeDelta::minutes(1))
            }
        }
    }

    /// Moves the cursor one partition forward. Only the audit loop advances this way.
    pub fn increment_partition(&mut self) {
        self.current = self.current.increment();
    }

    /// True once a whole second has passed after the window's last second.
    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        self.current
            .end()
            .checked_add_signed(TimeDelta::seconds(1))
            .is_some_and(|closed_at| closed_at <= now)
    }

    /// Delay for the successor job after aggregating the current partition.
    /// Fires one minute into the next window so late events of the closed one land first.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        let next = self.next_partition();
        if next.end() < now {
            return self.granularity.catch_up_delay();
        }
        let fire_at = after(next.start(), TimeDelta::minutes(1));
        (fire_at - now).abs().to_std().unwrap_or_default()
    }

    /// Delay for re-enqueueing the current partition: until its window closes.
    pub fn reschedule_delay(&self, now: DateTime<Utc>) -> Duration {
        let probe = self.next_partition().start();
        if probe < now {
            return RESCHEDULE_CATCH_UP;
        }
        (probe - now).to_std().unwrap_or_default()
    }

    /// Job payload for the current partition.
    pub fn payload(&self) -> AggregationJobPayload {
        payload_for(&self.current)
    }

    /// Aggregates the current partition if its window has closed and chains the successor;
    /// otherwise re-enqueues the current partition. Errors from `aggregate` or from
    /// enqueueing the successor turn into a reschedule of the current partition.
    pub async fn run_continuous<F, Fut, T>(
        &mut self,
        queue: &dyn JobQueue,
        now: DateTime<Utc>,
        aggregate: F,
    ) -> anyhow::Result<RunOutcome>
    where
        F: FnOnce(Partition) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.is_closed(now) {
            match self.aggregate_and_advance(queue, now, aggregate).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => warn!(
                    task = self.name(),
                    partition = %self.current,
                    error = %e,
                    "task run error, rescheduling current partition"
                ),
            }
        }
        self.reschedule(queue, now).await
    }

    /// Aggregates the current partition if its window has closed. Never schedules.
    /// Returns None when the window is still open.
    pub async fn run_once<F, Fut, T>(
        &self,
        now: DateTime<Utc>,
        aggregate: F,
    ) -> anyhow::Result<Option<T>>
    where
        F: FnOnce(Partition) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.is_closed(now) {
            return Ok(None);
        }
        aggregate(self.current).await.map(Some)
    }

    async fn aggregate_and_advance<F, Fut, T>(
        &mut self,
        queue: &dyn JobQueue,
        now: DateTime<Utc>,
        aggregate: F,
    ) -> anyhow::Result<RunOutcome>
    where
        F: FnOnce(Partition) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        info!(
            task = self.name(),
            partition = %self.current,
            "task is running"
        );
        aggregate(self.current).await?;

        let next = self.next_partition();
        let delay = self.next_delay(now);
        self.enqueue(queue, &next, delay).await?;
        info!(
            task = self.name(),
            next = %next,
            delay_ms = delay.as_millis() as u64,
            "next partition scheduled"
        );
        self.current = next;
        Ok(RunOutcome::Advanced { next, delay })
    }

    async fn reschedule(
        &self,
        queue: &dyn JobQueue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RunOutcome> {
        let delay = self.reschedule_delay(now);
        self.enqueue(queue, &self.current, delay).await?;
        debug!(
            task = self.name(),
            partition = %self.current,
            delay_ms = delay.as_millis() as u64,
            "partition rescheduled"
        );
        Ok(RunOutcome::Rescheduled {
            partition: self.current,
            delay,
        })
    }

    async fn enqueue(
        &self,
        queue: &dyn JobQueue,
        partition: &Partition,
        delay: Duration,
    ) -> anyhow::Result<i64> {
        let job = NewJob::new(self.granularity.job_name(), &payload_for(partition))?
            .priority(Priority::High)
            .delay(delay);
        queue.enqueue(job).await
    }
}

fn after(at: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn payload_for(partition: &Partition) -> AggregationJobPayload {
    AggregationJobPayload {
        kind: partition.granularity().aggregation_type(),
        partition: partition.number(),
        date: partition.start(),
    }
}
