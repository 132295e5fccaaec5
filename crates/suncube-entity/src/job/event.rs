//! Job lifecycle events published to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::types::JobId;

use super::error::JobError;
use super::model::Job;
use super::state::JobState;

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// A new job was accepted.
    Queued,
    /// A worker claimed the job.
    Running,
    /// The job produced its artifact.
    Succeeded,
    /// An attempt failed and a retry was scheduled.
    RetryScheduled,
    /// The job went back to the queue after a backoff or an expired lease.
    Requeued,
    /// The job will not be retried.
    DeadLettered,
}

impl JobEventKind {
    /// Return the event kind as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::RetryScheduled => "retry_scheduled",
            Self::Requeued => "requeued",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// A lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Job the event refers to.
    pub job_id: JobId,
    /// Event classification.
    pub kind: JobEventKind,
    /// Job state after the event.
    pub state: JobState,
    /// Concluded attempts after the event.
    pub attempts: u32,
    /// Artifact key, for `succeeded`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// Last error, for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// When the event occurred.
    pub at: DateTime<Utc>,
}

impl JobEvent {
    /// Snapshot an event from the job's current record.
    pub fn from_job(kind: JobEventKind, job: &Job) -> Self {
        Self {
            job_id: job.id,
            kind,
            state: job.state,
            attempts: job.attempts,
            storage_key: job.result.as_ref().map(|a| a.storage_key.clone()),
            error: job.error.clone(),
            at: job.updated_at,
        }
    }
}
