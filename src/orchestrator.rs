// Seeds one root job per granularity at startup and triggers the daily audit pass.
// Seeding is skipped for granularities whose chain already has a pending job.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};

use crate::models::{AUDIT_JOB, AggregationJobPayload, AuditJobPayload, Granularity};
use crate::queue::{JobQueue, NewJob, Priority};
use crate::shutdown::{self, ShutdownRx};
use crate::task::Task;

/// Granularities re-walked by the daily audit, in enqueue order.
pub const AUDITED_GRANULARITIES: [Granularity; 3] =
    [Granularity::Hour, Granularity::Minute, Granularity::Day];

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub startup_delay: Duration,
    /// UTC time of day (minute precision) the audit is triggered at.
    pub audit_time: NaiveTime,
    pub audit_check_interval: Duration,
    pub audited_days_retained: usize,
}

/// Days an audit was already enqueued for. Keeps only the most recent `capacity` days.
#[derive(Debug, Clone)]
pub struct AuditedDays {
    days: BTreeSet<NaiveDate>,
    capacity: usize,
}

impl AuditedDays {
    pub fn new(capacity: usize) -> Self {
        Self {
            days: BTreeSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.days.contains(&day)
    }

    /// Records `day`. Returns false if it was already recorded.
    pub fn insert(&mut self, day: NaiveDate) -> bool {
        if !self.days.insert(day) {
            return false;
        }
        while self.days.len() > self.capacity {
            self.days.pop_first();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaiveDate> {
        self.days.iter()
    }
}

pub struct Orchestrator {
    queue: Arc<dyn JobQueue>,
    config: OrchestratorConfig,
    audited: AuditedDays,
}

impl Orchestrator {
    pub fn new(queue: Arc<dyn JobQueue>, config: OrchestratorConfig) -> Self {
        let audited = AuditedDays::new(config.audited_days_retained);
        Self {
            queue,
            config,
            audited,
        }
    }

    pub fn audited_days(&self) -> &AuditedDays {
        &self.audited
    }

    /// Enqueues a root job for the partition containing `now` for every granularity that
    /// has no pending or running job of its own type. Returns the granularities that were seeded.
    #[instrument(skip(self), fields(operation = "bootstrap"))]
    pub async fn bootstrap(&self, now: DateTime<Utc>) -> Vec<Granularity> {
        let mut seeded = Vec::new();
        for granularity in Granularity::ALL {
            match self.seed_root_job(granularity, now).await {
                Ok(true) => seeded.push(granularity),
                Ok(false) => {}
                Err(e) => warn!(%granularity, error = %e, "root job check failed"),
            }
        }
        info!(seeded = seeded.len(), "bootstrap finished");
        seeded
    }

    async fn seed_root_job(
        &self,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let job_name = granularity.job_name();
        // A claimed job re-enqueues its own successor, so it counts as the chain.
        let live = self.queue.in_flight(job_name).await?;
        let has_root = live.iter().any(|job| {
            job.payload_as::<AggregationJobPayload>()
                .map(|p| p.kind == granularity.aggregation_type())
                .unwrap_or(false)
        });
        if has_root {
            debug!(%granularity, in_flight = live.len(), "root job already queued or running");
            return Ok(false);
        }

        let task = Task::new(granularity, now);
        let id = self
            .queue
            .enqueue(NewJob::new(job_name, &task.payload())?)
            .await?;
        info!(
            %granularity,
            job_id = id,
            partition = %task.current_partition(),
            "root job created"
        );
        Ok(true)
    }

    /// Enqueues audit jobs for the previous calendar day when `now` falls on the configured
    /// audit minute and that day has not been audited yet. Returns the audited day.
    pub async fn check_audit(
        &mut self,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<NaiveDate>> {
        let at = self.config.audit_time;
        if now.hour() != at.hour() || now.minute() != at.minute() {
            return Ok(None);
        }
        let Some(day) = now.date_naive().pred_opt() else {
            return Ok(None);
        };
        if self.audited.contains(day) {
            return Ok(None);
        }

        let (from, to) = day_bounds(day);
        for granularity in AUDITED_GRANULARITIES {
            let payload = AuditJobPayload {
                from,
                to,
                kind: granularity.aggregation_type(),
            };
            let job = NewJob::new(AUDIT_JOB, &payload)?.priority(Priority::High);
            let id = self.queue.enqueue(job).await?;
            debug!(%granularity, job_id = id, "audit job created");
        }
        self.audited.insert(day);
        info!(%day, "audit jobs created");
        Ok(Some(day))
    }

    /// Waits the startup delay, bootstraps, then checks the audit trigger on every interval
    /// until shutdown.
    pub fn spawn(mut self, mut shutdown_rx: ShutdownRx) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(self.config.startup_delay) => {}
                _ = shutdown::wait(&mut shutdown_rx) => return,
            }
            self.bootstrap(Utc::now()).await;

            let mut ticker = interval(self.config.audit_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown::wait(&mut shutdown_rx) => break,
                }
                if let Err(e) = self.check_audit(Utc::now()).await {
                    warn!(error = %e, "audit trigger failed");
                }
            }
            debug!("orchestrator shutting down");
        })
    }
}

/// First and last second of `day`, UTC.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = day.and_time(NaiveTime::MIN).and_utc();
    let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    (from, day.and_time(last).and_utc())
}
