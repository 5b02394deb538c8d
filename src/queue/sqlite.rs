// Persistent delayed-job queue in SQLite. Completed jobs are deleted; failed ones are kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::instrument;

use super::{JobQueue, NewJob, PENDING_LIMIT, Priority, QueuedJob, delay_ms, run_at};

const STATE_DELAYED: &str = "delayed";
const STATE_ACTIVE: &str = "active";
const STATE_FAILED: &str = "failed";

const JOB_COLUMNS: &str = "id, name, payload, priority, delay_ms, run_at, created_at, attempts";

pub struct SqliteJobQueue {
    pool: SqlitePool,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL,
                state TEXT NOT NULL,
                delay_ms INTEGER NOT NULL,
                run_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state_run_at ON jobs(state, run_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_name_state ON jobs(name, state)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn parse_job_row(row: &SqliteRow) -> anyhow::Result<QueuedJob> {
        let id: i64 = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let payload: String = row.try_get("payload")?;
        let priority: i64 = row.try_get("priority")?;
        let delay_ms: i64 = row.try_get("delay_ms")?;
        let run_at: i64 = row.try_get("run_at")?;
        let created_at: i64 = row.try_get("created_at")?;
        let attempts: i64 = row.try_get("attempts")?;

        Ok(QueuedJob {
            id,
            name,
            payload: serde_json::from_str(&payload)?,
            priority: Priority::from_rank(priority),
            delay_ms: delay_ms.max(0) as u64,
            run_at: from_millis(run_at)?,
            created_at: from_millis(created_at)?,
            attempts: attempts.max(0) as u32,
        })
    }
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", ms))
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    #[instrument(skip(self, job), fields(queue = "sqlite", operation = "enqueue", job = %job.name))]
    async fn enqueue(&self, job: NewJob) -> anyhow::Result<i64> {
        let created_at = Utc::now();
        let run_at = run_at(created_at, job.delay);
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO jobs (name, payload, priority, state, delay_ms, run_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&job.name)
        .bind(job.payload.to_string())
        .bind(job.priority.rank())
        .bind(STATE_DELAYED)
        .bind(delay_ms(job.delay) as i64)
        .bind(run_at.timestamp_millis())
        .bind(created_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn pending(&self, name: &str) -> anyhow::Result<Vec<QueuedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE name = $1 AND state = $2
             ORDER BY run_at ASC, id ASC LIMIT $3"
        ))
        .bind(name)
        .bind(STATE_DELAYED)
        .bind(PENDING_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_job_row(&row)?);
        }
        Ok(out)
    }

    async fn in_flight(&self, name: &str) -> anyhow::Result<Vec<QueuedJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE name = $1 AND state IN ($2, $3)
             ORDER BY run_at ASC, id ASC LIMIT $4"
        ))
        .bind(name)
        .bind(STATE_DELAYED)
        .bind(STATE_ACTIVE)
        .bind(PENDING_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_job_row(&row)?);
        }
        Ok(out)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> anyhow::Result<Option<QueuedJob>> {
        let row = sqlx::query(&format!(
            "UPDATE jobs SET state = $1, attempts = attempts + 1
             WHERE id = (
                 SELECT id FROM jobs WHERE state = $2 AND run_at <= $3
                 ORDER BY priority DESC, run_at ASC, id ASC LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(STATE_ACTIVE)
        .bind(STATE_DELAYED)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    #[instrument(skip(self), fields(queue = "sqlite", operation = "complete"))]
    async fn complete(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = "sqlite", operation = "fail"))]
    async fn fail(&self, id: i64, error: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE jobs SET state = $1, last_error = $2 WHERE id = $3")
            .bind(STATE_FAILED)
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = "sqlite", operation = "recover_active"))]
    async fn recover_active(&self) -> anyhow::Result<u64> {
        let r = sqlx::query("UPDATE jobs SET state = $1 WHERE state = $2")
            .bind(STATE_DELAYED)
            .bind(STATE_ACTIVE)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}
