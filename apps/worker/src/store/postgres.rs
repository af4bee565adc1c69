use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use soulbridge_shared_config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use super::JobStore;
use crate::error::{WorkerError, WorkerResult};
use crate::job::{JobId, JobPayload, JobRecord, JobStatus, Priority};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS soulbridge_jobs (
    id UUID PRIMARY KEY,
    job_type TEXT NOT NULL,
    payload JSONB NOT NULL,
    priority SMALLINT NOT NULL,
    status TEXT NOT NULL,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL,
    next_run_at TIMESTAMPTZ,
    error_message TEXT,
    recovery_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    revision BIGINT NOT NULL DEFAULT 0
)
"#;

const REVISION_COLUMN: &str =
    "ALTER TABLE soulbridge_jobs ADD COLUMN IF NOT EXISTS revision BIGINT NOT NULL DEFAULT 0";

const STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS soulbridge_jobs_status_idx ON soulbridge_jobs (status, created_at)";

const SELECT_COLUMNS: &str = "id, payload, priority, status, attempt_count, max_retries, \
     next_run_at, error_message, recovery_count, created_at, updated_at, revision";

/// PostgreSQL job store
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    payload: serde_json::Value,
    priority: i16,
    status: String,
    attempt_count: i32,
    max_retries: i32,
    next_run_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    recovery_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revision: i64,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = WorkerError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let payload: JobPayload = serde_json::from_value(row.payload)
            .map_err(|e| WorkerError::corrupt_record(row.id, format!("payload: {}", e)))?;
        let status: JobStatus = row
            .status
            .parse()
            .map_err(|e: String| WorkerError::corrupt_record(row.id, e))?;
        let priority = u8::try_from(row.priority)
            .ok()
            .and_then(Priority::new)
            .ok_or_else(|| {
                WorkerError::corrupt_record(row.id, format!("priority {} out of range", row.priority))
            })?;

        Ok(JobRecord {
            id: JobId::from_uuid(row.id),
            payload,
            priority,
            status,
            attempt_count: non_negative(row.attempt_count),
            max_retries: non_negative(row.max_retries),
            next_run_at: row.next_run_at,
            error_message: row.error_message,
            recovery_count: non_negative(row.recovery_count),
            created_at: row.created_at,
            updated_at: row.updated_at,
            revision: u64::try_from(row.revision).unwrap_or(0),
            seq: 0,
        })
    }
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_db_revision(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PgJobStore {
    /// Connect and make sure the jobs table exists
    pub async fn connect(config: &DatabaseConfig) -> WorkerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        let store = Self::from_pool(pool);
        store.ensure_schema().await?;
        tracing::info!("Job store connected");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> WorkerResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query(REVISION_COLUMN).execute(&self.pool).await?;
        sqlx::query(STATUS_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    fn decode_all(rows: Vec<JobRow>) -> Vec<JobRecord> {
        rows.into_iter()
            .filter_map(|row| match JobRecord::try_from(row) {
                Ok(job) => Some(job),
                Err(e) => {
                    e.log();
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn save(&self, job: &JobRecord) -> WorkerResult<()> {
        let payload = serde_json::to_value(&job.payload)?;
        sqlx::query(
            r#"
            INSERT INTO soulbridge_jobs (
                id, job_type, payload, priority, status, attempt_count, max_retries,
                next_run_at, error_message, recovery_count, created_at, updated_at, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.kind().as_str())
        .bind(payload)
        .bind(i16::from(job.priority.value()))
        .bind(job.status.as_str())
        .bind(to_db_int(job.attempt_count))
        .bind(to_db_int(job.max_retries))
        .bind(job.next_run_at)
        .bind(&job.error_message)
        .bind(to_db_int(job.recovery_count))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(to_db_revision(job.revision))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: JobId) -> WorkerResult<Option<JobRecord>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM soulbridge_jobs WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> WorkerResult<Vec<JobRecord>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM soulbridge_jobs WHERE status = ANY($1) ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        Ok(Self::decode_all(rows))
    }

    async fn update(&self, job: &JobRecord) -> WorkerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE soulbridge_jobs SET
                priority = $2,
                status = $3,
                attempt_count = $4,
                next_run_at = $5,
                error_message = $6,
                recovery_count = $7,
                updated_at = $8,
                revision = $9
            WHERE id = $1 AND revision <= $9
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(i16::from(job.priority.value()))
        .bind(job.status.as_str())
        .bind(to_db_int(job.attempt_count))
        .bind(job.next_run_at)
        .bind(&job.error_message)
        .bind(to_db_int(job.recovery_count))
        .bind(job.updated_at)
        .bind(to_db_revision(job.revision))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM soulbridge_jobs WHERE id = $1)")
                .bind(job.id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(WorkerError::NotFound(job.id));
        }
        tracing::debug!(job.id = %job.id, revision = job.revision, "Skipped stale job write");
        Ok(())
    }
}
