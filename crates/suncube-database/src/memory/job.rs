//! In-memory job store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use suncube_core::error::AppError;
use suncube_core::result::AppResult;
use suncube_core::types::JobId;
use suncube_entity::{Job, JobState, JobTransition, NewJob};

use crate::repositories::{JobStore, StateCounts};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Most recent job per idempotency key.
    by_key: HashMap<String, JobId>,
}

/// Job store held in process memory.
///
/// A single lock guards both the job table and the key index, which makes
/// key-uniqueness checks and compare-and-swap transitions atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, data: NewJob) -> AppResult<Job> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner
            .by_key
            .get(&data.idempotency_key)
            .and_then(|id| inner.jobs.get(id))
        {
            if existing.state.is_live() {
                return Err(AppError::conflict(format!(
                    "A live job already exists for key '{}'",
                    data.idempotency_key
                )));
            }
        }

        let job = Job::queued(data, Utc::now());
        inner.by_key.insert(job.idempotency_key.clone(), job.id);
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> AppResult<Job> {
        let inner = self.inner.lock().await;
        inner
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))
    }

    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Job> {
        let inner = self.inner.lock().await;
        inner
            .by_key
            .get(key)
            .and_then(|id| inner.jobs.get(id))
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("No job for key '{key}'")))
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        changes: JobTransition,
    ) -> AppResult<Job> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

        changes.check(job, from, to)?;
        changes.apply(job, to, Utc::now());

        debug!(job_id = %id, from = %from, to = %to, attempts = job.attempts, "Job transitioned");
        Ok(job.clone())
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.lease_expired(now))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.lease_expires_at);
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn find_due_retries(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.retry_due(now))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.next_attempt_at);
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn find_stalled_queued(&self, before: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.queue_stalled(before))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.updated_at);
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn count_by_state(&self) -> AppResult<StateCounts> {
        let inner = self.inner.lock().await;
        let mut counts = StateCounts::default();
        for job in inner.jobs.values() {
            *counts.0.entry(job.state).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn list_recent(&self, limit: u32) -> AppResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }
}
