//! PostgreSQL job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;

use suncube_core::error::{AppError, ErrorKind};
use suncube_core::result::AppResult;
use suncube_core::types::JobId;
use suncube_entity::{Artifact, Job, JobError, JobState, JobTransition, NewJob, TaskType};

use super::{JobStore, StateCounts};

/// Row shape of the `jobs` table. `state` and `task_type` are stored as text.
#[derive(Debug, FromRow)]
struct JobRow {
    id: JobId,
    idempotency_key: String,
    task_type: String,
    payload: serde_json::Value,
    state: String,
    attempts: i32,
    max_attempts: i32,
    result: Option<Json<Artifact>>,
    error: Option<Json<JobError>>,
    worker_id: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state: JobState = row.state.parse().map_err(AppError::database)?;
        let task_type: TaskType = row.task_type.parse().map_err(AppError::database)?;
        Ok(Job {
            id: row.id,
            idempotency_key: row.idempotency_key,
            task_type,
            payload: row.payload,
            state,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or(0),
            result: row.result.map(|Json(a)| a),
            error: row.error.map(|Json(e)| e),
            worker_id: row.worker_id,
            lease_expires_at: row.lease_expires_at,
            next_attempt_at: row.next_attempt_at,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

fn db_err(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, message, e)
}

fn into_jobs(rows: Vec<JobRow>) -> AppResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

/// Job store backed by the `jobs` table.
///
/// Transitions lock the row (`SELECT ... FOR UPDATE`) and validate the
/// expected state inside the same transaction, so two workers racing on the
/// same job cannot both win.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Create a new job store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock(tx: &mut Transaction<'_, Postgres>, id: JobId) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err("Failed to lock job"))?;
        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::not_found(format!("Job {id} not found"))),
        }
    }

    async fn write(tx: &mut Transaction<'_, Postgres>, job: &Job) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE jobs SET state = $2, attempts = $3, result = $4, error = $5, worker_id = $6, \
             lease_expires_at = $7, next_attempt_at = $8, started_at = $9, completed_at = $10, \
             updated_at = $11 \
             WHERE id = $1 RETURNING *",
        )
        .bind(job.id)
        .bind(job.state.as_str())
        .bind(job.attempts as i32)
        .bind(job.result.as_ref().map(Json))
        .bind(job.error.as_ref().map(Json))
        .bind(job.worker_id.as_deref())
        .bind(job.lease_expires_at)
        .bind(job.next_attempt_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err("Failed to update job"))?;
        row.try_into()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, data: NewJob) -> AppResult<Job> {
        let job = Job::queued(data, Utc::now());
        let result = sqlx::query_as::<_, JobRow>(
            "INSERT INTO jobs (id, idempotency_key, task_type, payload, state, attempts, \
             max_attempts, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $7) RETURNING *",
        )
        .bind(job.id)
        .bind(&job.idempotency_key)
        .bind(job.task_type.as_str())
        .bind(&job.payload)
        .bind(job.state.as_str())
        .bind(job.max_attempts as i32)
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::conflict(
                format!("A live job already exists for key '{}'", job.idempotency_key),
            )),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Database,
                "Failed to create job",
                e,
            )),
        }
    }

    async fn get(&self, id: JobId) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to find job"))?;
        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::not_found(format!("Job {id} not found"))),
        }
    }

    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE idempotency_key = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find job by idempotency key"))?;
        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::not_found(format!("No job for key '{key}'"))),
        }
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        changes: JobTransition,
    ) -> AppResult<Job> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let mut job = Self::lock(&mut tx, id).await?;
        changes.check(&job, from, to)?;
        changes.apply(&mut job, to, Utc::now());
        let job = Self::write(&mut tx, &job).await?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit job transition"))?;

        debug!(job_id = %id, from = %from, to = %to, attempts = job.attempts, "Job transitioned");
        Ok(job)
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = 'running' AND lease_expires_at <= $1 \
             ORDER BY lease_expires_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find expired leases"))?;
        into_jobs(rows)
    }

    async fn find_due_retries(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = 'failed' \
             AND (next_attempt_at IS NULL OR next_attempt_at <= $1) \
             ORDER BY next_attempt_at ASC NULLS FIRST LIMIT $2",
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find due retries"))?;
        into_jobs(rows)
    }

    async fn find_stalled_queued(&self, before: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = 'queued' AND updated_at <= $1 \
             ORDER BY updated_at ASC LIMIT $2",
        )
        .bind(before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find stalled jobs"))?;
        into_jobs(rows)
    }

    async fn count_by_state(&self) -> AppResult<StateCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err("Failed to count jobs"))?;

        let mut counts = StateCounts::default();
        for (state, count) in rows {
            let state: JobState = state.parse().map_err(AppError::database)?;
            counts.0.insert(state, count as u64);
        }
        Ok(counts)
    }

    async fn list_recent(&self, limit: u32) -> AppResult<Vec<Job>> {
        let rows =
            sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1")
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err("Failed to list jobs"))?;
        into_jobs(rows)
    }
}
