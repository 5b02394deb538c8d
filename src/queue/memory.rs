// In-process job queue with the same contract as the SQLite one.
// Nothing survives the process; used for tests and local runs.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{JobQueue, NewJob, PENDING_LIMIT, QueuedJob, delay_ms, run_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Delayed,
    Active,
    Failed,
}

#[derive(Debug)]
struct StoredJob {
    job: QueuedJob,
    state: JobState,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    jobs: Vec<StoredJob>,
}

#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    inner: Mutex<Inner>,
}

fn poison_err<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow::anyhow!("job queue lock poisoned")
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(poison_err)
    }

    /// Every job still waiting to run, in enqueue order.
    pub fn delayed(&self) -> Vec<QueuedJob> {
        self.snapshot(JobState::Delayed)
    }

    /// Failed jobs with their error text.
    pub fn failed(&self) -> Vec<(QueuedJob, String)> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        inner
            .jobs
            .iter()
            .filter(|s| s.state == JobState::Failed)
            .map(|s| (s.job.clone(), s.last_error.clone().unwrap_or_default()))
            .collect()
    }

    fn snapshot(&self, state: JobState) -> Vec<QueuedJob> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        inner
            .jobs
            .iter()
            .filter(|s| s.state == state)
            .map(|s| s.job.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: NewJob) -> anyhow::Result<i64> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        let created_at = Utc::now();
        inner.jobs.push(StoredJob {
            job: QueuedJob {
                id,
                run_at: run_at(created_at, job.delay),
                delay_ms: delay_ms(job.delay),
                name: job.name,
                payload: job.payload,
                priority: job.priority,
                created_at,
                attempts: 0,
            },
            state: JobState::Delayed,
            last_error: None,
        });
        Ok(id)
    }

    async fn pending(&self, name: &str) -> anyhow::Result<Vec<QueuedJob>> {
        let inner = self.lock()?;
        let mut out: Vec<QueuedJob> = inner
            .jobs
            .iter()
            .filter(|s| s.state == JobState::Delayed && s.job.name == name)
            .map(|s| s.job.clone())
            .collect();
        out.sort_by_key(|j| (j.run_at, j.id));
        out.truncate(PENDING_LIMIT);
        Ok(out)
    }

    async fn in_flight(&self, name: &str) -> anyhow::Result<Vec<QueuedJob>> {
        let inner = self.lock()?;
        let mut out: Vec<QueuedJob> = inner
            .jobs
            .iter()
            .filter(|s| s.state != JobState::Failed && s.job.name == name)
            .map(|s| s.job.clone())
            .collect();
        out.sort_by_key(|j| (j.run_at, j.id));
        out.truncate(PENDING_LIMIT);
        Ok(out)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> anyhow::Result<Option<QueuedJob>> {
        let mut inner = self.lock()?;
        let next = inner
            .jobs
            .iter_mut()
            .filter(|s| s.state == JobState::Delayed && s.job.run_at <= now)
            .min_by_key(|s| {
                (
                    std::cmp::Reverse(s.job.priority.rank()),
                    s.job.run_at,
                    s.job.id,
                )
            });
        Ok(next.map(|s| {
            s.state = JobState::Active;
            s.job.attempts += 1;
            s.job.clone()
        }))
    }

    async fn complete(&self, id: i64) -> anyhow::Result<()> {
        self.lock()?.jobs.retain(|s| s.job.id != id);
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(s) = inner.jobs.iter_mut().find(|s| s.job.id == id) {
            s.state = JobState::Failed;
            s.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn recover_active(&self) -> anyhow::Result<u64> {
        let mut inner = self.lock()?;
        let mut recovered = 0;
        for s in inner.jobs.iter_mut().filter(|s| s.state == JobState::Active) {
            s.state = JobState::Delayed;
            recovered += 1;
        }
        Ok(recovered)
    }
}
