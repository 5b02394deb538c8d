// SQLite event log and rollup table. Implements the aggregation side of every task.
// Rollups are keyed by (granularity, period_start); a window with no events still gets a zero row.
// This process never ingests events: `event_log` is filled by the tracking service that shares
// the database file, and rollupd only reads it.

use anyhow::ensure;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::instrument;

use crate::aggregator::StatsAggregator;
use crate::models::{AggregationType, LogEvent, StatsRow};
use crate::partition::Partition;

pub struct StatsRepo {
    pool: SqlitePool,
}

impl StatsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS event_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event TEXT NOT NULL,
                type TEXT NOT NULL,
                time INTEGER NOT NULL,
                visitor_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                data REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_log_time ON event_log(time)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rollup_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                granularity INTEGER NOT NULL,
                period_start INTEGER NOT NULL,
                period_end INTEGER NOT NULL,
                partition_no INTEGER NOT NULL,
                visitors INTEGER NOT NULL,
                sessions INTEGER NOT NULL,
                events INTEGER NOT NULL,
                collected_at INTEGER NOT NULL,
                UNIQUE (granularity, period_start)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores one tracked event. Every identifying field must be non-empty.
    ///
    /// The server never calls this; it mirrors the validation the external event writer applies
    /// and is used to seed `event_log` in tests and local tooling.
    #[instrument(skip(self, event), fields(repo = "stats", operation = "log_event", event = %event.event))]
    pub async fn log_event(&self, event: &LogEvent) -> anyhow::Result<i64> {
        ensure!(!event.event.is_empty(), "'event' field is required");
        ensure!(!event.kind.is_empty(), "'type' field is required");
        ensure!(event.time > 0, "'time' field is required");
        ensure!(!event.visitor_id.is_empty(), "'visitorId' field is required");
        ensure!(!event.session_id.is_empty(), "'sessionId' field is required");

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO event_log (event, type, time, visitor_id, session_id, data)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&event.event)
        .bind(&event.kind)
        .bind(event.time)
        .bind(&event.visitor_id)
        .bind(&event.session_id)
        .bind(event.data)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    fn parse_stats_row(row: &SqliteRow) -> anyhow::Result<StatsRow> {
        let granularity: i64 = row.try_get("granularity")?;
        let partition: i64 = row.try_get("partition_no")?;
        Ok(StatsRow {
            granularity: u8::try_from(granularity)?,
            period_start: row.try_get("period_start")?,
            partition: u32::try_from(partition)?,
            visitors: row.try_get("visitors")?,
            sessions: row.try_get("sessions")?,
            events: row.try_get("events")?,
            collected_at: row.try_get("collected_at")?,
        })
    }
}

fn type_ordinal(partition: &Partition) -> i64 {
    i64::from(u8::from(AggregationType::from(partition.granularity())))
}

#[async_trait]
impl StatsAggregator for StatsRepo {
    #[instrument(skip_all, fields(repo = "stats", operation = "fetch_stats", partition = %partition))]
    async fn fetch_stats(&self, partition: &Partition) -> anyhow::Result<Vec<StatsRow>> {
        let rows = sqlx::query(
            "SELECT granularity, period_start, partition_no, visitors, sessions, events, collected_at
             FROM rollup_stats WHERE granularity = $1 AND period_start = $2",
        )
        .bind(type_ordinal(partition))
        .bind(partition.start().timestamp())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_stats_row(&row)?);
        }
        Ok(out)
    }

    #[instrument(skip_all, fields(repo = "stats", operation = "aggregate_stats", partition = %partition))]
    async fn aggregate_stats(&self, partition: &Partition) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO rollup_stats
            (granularity, period_start, period_end, partition_no, visitors, sessions, events, collected_at)
            SELECT $1, $2, $3, $4,
                   COUNT(DISTINCT visitor_id), COUNT(DISTINCT session_id), COUNT(*), $5
            FROM event_log WHERE time >= $6 AND time <= $7
            "#,
        )
        .bind(type_ordinal(partition))
        .bind(partition.start().timestamp())
        .bind(partition.end().timestamp())
        .bind(i64::from(partition.number()))
        .bind(Utc::now().timestamp_millis())
        .bind(partition.start().timestamp())
        .bind(partition.end().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
