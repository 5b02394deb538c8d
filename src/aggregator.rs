// Persistence collaborator: reports existing rollups and performs the rollup write.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::StatsRow;
use crate::partition::Partition;

/// Storage side of the rollup. Implementations dispatch on `partition.granularity()`.
#[async_trait]
pub trait StatsAggregator: Send + Sync {
    /// Rows already aggregated for `partition`. Non-empty means the partition is done.
    async fn fetch_stats(&self, partition: &Partition) -> anyhow::Result<Vec<StatsRow>>;

    /// Rolls up the raw events of `partition`. Not assumed to be idempotent.
    async fn aggregate_stats(&self, partition: &Partition) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOutcome {
    Aggregated,
    AlreadyCollected,
}

/// Aggregates `partition` unless rows for it already exist.
pub async fn aggregate_if_missing(
    aggregator: &dyn StatsAggregator,
    task_name: &str,
    partition: Partition,
) -> anyhow::Result<AggregationOutcome> {
    let existing = aggregator.fetch_stats(&partition).await?;
    if !existing.is_empty() {
        warn!(
            task = task_name,
            partition = %partition,
            rows = existing.len(),
            "data has already been collected for partition"
        );
        return Ok(AggregationOutcome::AlreadyCollected);
    }
    debug!(task = task_name, partition = %partition, "run aggregation");
    aggregator.aggregate_stats(&partition).await?;
    debug!(task = task_name, partition = %partition, "aggregation completed");
    Ok(AggregationOutcome::Aggregated)
}
