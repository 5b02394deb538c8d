// Shared test helpers
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollupd::aggregator::StatsAggregator;
use rollupd::models::{AggregationType, StatsRow};
use rollupd::partition::Partition;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn row_for(partition: &Partition) -> StatsRow {
    StatsRow {
        granularity: u8::from(AggregationType::from(partition.granularity())),
        period_start: partition.start().timestamp(),
        partition: partition.number(),
        visitors: 1,
        sessions: 1,
        events: 1,
        collected_at: 0,
    }
}

/// In-memory aggregator that records every call. Aggregated partitions count as existing.
#[derive(Default)]
pub struct RecordingAggregator {
    existing: Mutex<HashSet<Partition>>,
    aggregated: Mutex<Vec<Partition>>,
    fetches: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(partitions: impl IntoIterator<Item = Partition>) -> Self {
        let agg = Self::default();
        agg.existing.lock().unwrap().extend(partitions);
        agg
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn aggregated(&self) -> Vec<Partition> {
        self.aggregated.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatsAggregator for RecordingAggregator {
    async fn fetch_stats(&self, partition: &Partition) -> anyhow::Result<Vec<StatsRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.existing.lock().unwrap().contains(partition) {
            Ok(vec![row_for(partition)])
        } else {
            Ok(vec![])
        }
    }

    async fn aggregate_stats(&self, partition: &Partition) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        self.aggregated.lock().unwrap().push(*partition);
        self.existing.lock().unwrap().insert(*partition);
        Ok(())
    }
}
