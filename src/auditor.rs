// Audit / backfill: re-walks historical partitions and aggregates the ones that were missed.
// Runs either one partition (CLI one-shot) or a supervised polling loop over a range.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use crate::aggregator::{AggregationOutcome, StatsAggregator, aggregate_if_missing};
use crate::models::Granularity;
use crate::shutdown::{self, ShutdownRx};
use crate::task::Task;

/// Tick of the keep-running audit loop.
pub const DEFAULT_TICK: Duration = Duration::from_millis(2000);

/// Source of the current time for deciding whether a partition has closed.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Counts of what an audit did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub aggregated: u32,
    pub skipped: u32,
    pub failed: u32,
    pub cancelled: bool,
}

pub struct Auditor {
    aggregator: Arc<dyn StatsAggregator>,
    tick: Duration,
    shutdown: Option<ShutdownRx>,
    clock: Clock,
}

impl Auditor {
    pub fn new(aggregator: Arc<dyn StatsAggregator>, tick: Duration) -> Self {
        Self {
            aggregator,
            tick,
            shutdown: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Stops keep-running audits when the process shuts down.
    pub fn with_shutdown(mut self, shutdown: ShutdownRx) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Replaces the wall clock used to decide whether a partition has closed.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Audits `granularity` partitions starting with the one containing `from + 1s`.
    ///
    /// With `keep_running`, every tick runs the current partition once; a partition whose
    /// window is still open is retried on the next tick, a closed one is aggregated (or
    /// skipped when rows already exist) and the cursor advances. The loop ends when the
    /// cursor's partition starts at or after `to`.
    ///
    /// Without `keep_running`, only the first partition is run.
    #[instrument(skip_all, fields(%granularity, keep_running))]
    pub async fn audit(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
        keep_running: bool,
    ) -> AuditReport {
        let start = from.checked_add_signed(TimeDelta::seconds(1)).unwrap_or(from);
        let mut task = Task::new(granularity, start);
        let mut report = AuditReport::default();
        info!(
            from = %from.format("%Y-%m-%d %H:%M:%S"),
            to = %to.format("%Y-%m-%d %H:%M:%S"),
            "audit started"
        );

        if !keep_running {
            self.audit_partition(&task, &mut report).await;
            log_report(granularity, &report);
            return report;
        }

        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while task.current_partition().start() < to {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown::wait_opt(&mut shutdown) => {
                    info!("audit cancelled by shutdown");
                    report.cancelled = true;
                    break;
                }
            }
            if self.audit_partition(&task, &mut report).await {
                task.increment_partition();
            } else {
                debug!(
                    partition = %task.current_partition(),
                    expected = %task.execution_time(),
                    "partition still open, waiting"
                );
            }
        }

        log_report(granularity, &report);
        report
    }

    /// Runs the task's current partition once. Returns false while its window is open.
    async fn audit_partition(&self, task: &Task, report: &mut AuditReport) -> bool {
        let aggregator = self.aggregator.as_ref();
        let name = task.name();
        let result = task
            .run_once((self.clock)(), |partition| {
                aggregate_if_missing(aggregator, name, partition)
            })
            .await;
        match result {
            Ok(Some(AggregationOutcome::Aggregated)) => {
                report.aggregated += 1;
                true
            }
            Ok(Some(AggregationOutcome::AlreadyCollected)) => {
                report.skipped += 1;
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!(
                    task = name,
                    partition = %task.current_partition(),
                    error = %e,
                    "audit error"
                );
                report.failed += 1;
                true
            }
        }
    }
}

fn log_report(granularity: Granularity, report: &AuditReport) {
    info!(
        %granularity,
        aggregated = report.aggregated,
        skipped = report.skipped,
        failed = report.failed,
        cancelled = report.cancelled,
        "audit finished"
    );
}
