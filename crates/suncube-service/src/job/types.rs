//! Values returned by the job service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::types::JobId;
use suncube_database::StateCounts;
use suncube_entity::{Artifact, Job, JobError, JobState, TaskType};
use suncube_queue::QueueDepth;

/// Outcome of a submit call.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The job now responsible for the request.
    pub job: Job,
    /// Whether `job` already existed for the idempotency key.
    pub deduplicated: bool,
}

/// Caller-facing view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Job identifier.
    pub job_id: JobId,
    /// Deduplication key the job was submitted under.
    pub idempotency_key: String,
    /// Kind of work.
    pub task_type: TaskType,
    /// Current state.
    pub state: JobState,
    /// Concluded attempts.
    pub attempts: u32,
    /// Attempt ceiling.
    pub max_attempts: u32,
    /// Produced artifact, once succeeded.
    pub result: Option<Artifact>,
    /// Last recorded failure.
    pub error: Option<JobError>,
    /// When a pending retry becomes due.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobStatus {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            idempotency_key: job.idempotency_key,
            task_type: job.task_type,
            state: job.state,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            result: job.result,
            error: job.error,
            next_attempt_at: job.next_attempt_at,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// A time-limited download link for a job's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLink {
    /// Job that produced the artifact.
    pub job_id: JobId,
    /// Where the artifact is stored.
    pub storage_key: String,
    /// Download URL.
    pub url: String,
    /// When `url` stops working.
    pub expires_at: DateTime<Utc>,
}

/// Operator snapshot of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Jobs per state.
    pub jobs: StateCounts,
    /// Queue backlog.
    pub queue: QueueDepth,
}
