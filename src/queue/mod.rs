// Delayed-job queue: the only thing that keeps a granularity's chain alive between runs.
// Each job invocation enqueues its own successor; nothing loops in-process.

mod memory;
mod sqlite;

pub use memory::InMemoryJobQueue;
pub use sqlite::SqliteJobQueue;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// How many pending jobs `pending` returns at most.
pub const PENDING_LIMIT: usize = 100;

/// Job priority. Higher priorities are claimed first among due jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn rank(self) -> i64 {
        match self {
            Priority::Low => -10,
            Priority::Normal => 0,
            Priority::Medium => 5,
            Priority::High => 10,
            Priority::Critical => 15,
        }
    }

    pub fn from_rank(rank: i64) -> Self {
        match rank {
            r if r >= 15 => Priority::Critical,
            r if r >= 10 => Priority::High,
            r if r >= 5 => Priority::Medium,
            r if r >= 0 => Priority::Normal,
            _ => Priority::Low,
        }
    }
}

/// A job to enqueue. Built like `NewJob::new(name, &payload)?.priority(..).delay(..)`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub delay: Duration,
}

impl NewJob {
    pub fn new(name: impl Into<String>, payload: &impl Serialize) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.into(),
            payload: serde_json::to_value(payload)?,
            priority: Priority::Normal,
            delay: Duration::ZERO,
        })
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A stored job waiting for (or undergoing) execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub id: i64,
    pub name: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub delay_ms: u64,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

impl QueuedJob {
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, JobError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// Storage and delivery of delayed jobs across process restarts.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Stores `job` to become due after its delay. Returns the job id.
    async fn enqueue(&self, job: NewJob) -> anyhow::Result<i64>;

    /// Jobs named `name` that are waiting to run, soonest first (at most [`PENDING_LIMIT`]).
    async fn pending(&self, name: &str) -> anyhow::Result<Vec<QueuedJob>>;

    /// Jobs named `name` that are either waiting or currently claimed by a worker
    /// (at most [`PENDING_LIMIT`]). Failed jobs are not included.
    async fn in_flight(&self, name: &str) -> anyhow::Result<Vec<QueuedJob>>;

    /// Atomically takes the highest-priority job due at `now` and marks it active.
    async fn claim_due(&self, now: DateTime<Utc>) -> anyhow::Result<Option<QueuedJob>>;

    /// Removes a finished job.
    async fn complete(&self, id: i64) -> anyhow::Result<()>;

    /// Marks a job failed; it will not be delivered again.
    async fn fail(&self, id: i64, error: &str) -> anyhow::Result<()>;

    /// Returns jobs left active by a previous process to the pending state.
    async fn recover_active(&self) -> anyhow::Result<u64>;
}

fn delay_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

fn run_at(created_at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| created_at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
