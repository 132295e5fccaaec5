//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::types::JobId;

use super::error::JobError;
use super::state::JobState;
use super::task::TaskType;
use crate::artifact::Artifact;

/// A background job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Deduplication key; at most one live job exists per key.
    pub idempotency_key: String,
    /// Kind of work to perform.
    pub task_type: TaskType,
    /// Task-specific input.
    pub payload: serde_json::Value,
    /// Current lifecycle state.
    pub state: JobState,
    /// Number of concluded execution attempts.
    pub attempts: u32,
    /// Upper bound for `attempts`.
    pub max_attempts: u32,
    /// Produced artifact, set on success.
    pub result: Option<Artifact>,
    /// Last observed failure.
    pub error: Option<JobError>,
    /// Worker that claimed the job most recently.
    pub worker_id: Option<String>,
    /// Deadline after which a `running` job is reclaimed by the reaper.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// When a `failed` job becomes eligible to run again.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the most recent attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a freshly queued job from creation data.
    pub fn queued(data: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            idempotency_key: data.idempotency_key,
            task_type: data.task_type,
            payload: data.payload,
            state: JobState::Queued,
            attempts: 0,
            max_attempts: data.max_attempts,
            result: None,
            error: None,
            worker_id: None,
            lease_expires_at: None,
            next_attempt_at: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Attempts left before the job is dead-lettered.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Whether the job's lease has run out at `now`.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Running && self.lease_expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the job has sat in `queued` unchanged since `before`.
    pub fn queue_stalled(&self, before: DateTime<Utc>) -> bool {
        self.state == JobState::Queued && self.updated_at <= before
    }

    /// Whether a pending retry is due at `now`.
    pub fn retry_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Failed && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// Data required to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Deduplication key.
    pub idempotency_key: String,
    /// Kind of work to perform.
    pub task_type: TaskType,
    /// Task-specific input.
    pub payload: serde_json::Value,
    /// Maximum execution attempts.
    pub max_attempts: u32,
}
