//! Response DTOs.
//!
//! Field names are camelCase on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::types::{JobId, PaymentId};
use suncube_entity::{Artifact, JobError, JobState, TaskType};
use suncube_queue::QueueDepth;
use suncube_service::{ArtifactLink, JobStatus, PipelineStats, Submission};

/// Response to a submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Job handling the request.
    pub job_id: JobId,
    /// Its current state.
    pub state: JobState,
    /// Whether an existing job was returned.
    pub deduplicated: bool,
}

impl From<&Submission> for SubmitResponse {
    fn from(s: &Submission) -> Self {
        Self {
            job_id: s.job.id,
            state: s.job.state,
            deduplicated: s.deduplicated,
        }
    }
}

/// Stored artifact summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResponse {
    /// Object store key.
    pub storage_key: String,
    /// Source payment.
    pub payment_id: PaymentId,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl From<Artifact> for ArtifactResponse {
    fn from(a: Artifact) -> Self {
        Self {
            storage_key: a.storage_key,
            payment_id: a.payment_id,
            content_type: a.content_type,
            size_bytes: a.size_bytes,
        }
    }
}

/// Job status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    /// Job ID.
    pub job_id: JobId,
    /// Idempotency key.
    pub idempotency_key: String,
    /// Task type.
    pub task_type: TaskType,
    /// State.
    pub state: JobState,
    /// Concluded attempts.
    pub attempts: u32,
    /// Attempt ceiling.
    pub max_attempts: u32,
    /// Artifact, once succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ArtifactResponse>,
    /// Last error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Pending retry time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Started at.
    pub started_at: Option<DateTime<Utc>>,
    /// Completed at.
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobStatus> for JobResponse {
    fn from(s: JobStatus) -> Self {
        Self {
            job_id: s.job_id,
            idempotency_key: s.idempotency_key,
            task_type: s.task_type,
            state: s.state,
            attempts: s.attempts,
            max_attempts: s.max_attempts,
            result: s.result.map(ArtifactResponse::from),
            error: s.error,
            next_attempt_at: s.next_attempt_at,
            created_at: s.created_at,
            started_at: s.started_at,
            completed_at: s.completed_at,
        }
    }
}

/// List of jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    /// Jobs, newest first.
    pub items: Vec<JobResponse>,
}

/// Artifact download link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactUrlResponse {
    /// Pre-signed, time-limited URL.
    pub url: String,
    /// Expiry of `url`.
    pub expires_at: DateTime<Utc>,
}

impl From<ArtifactLink> for ArtifactUrlResponse {
    fn from(link: ArtifactLink) -> Self {
        Self {
            url: link.url,
            expires_at: link.expires_at,
        }
    }
}

/// Queue backlog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepthResponse {
    /// Waiting for a worker.
    pub ready: u64,
    /// Leased to a worker.
    pub in_flight: u64,
}

impl From<QueueDepth> for QueueDepthResponse {
    fn from(d: QueueDepth) -> Self {
        Self {
            ready: d.ready,
            in_flight: d.in_flight,
        }
    }
}

/// Pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Job count for every state, zeros included.
    pub jobs: BTreeMap<String, u64>,
    /// Total jobs.
    pub total: u64,
    /// Queue backlog.
    pub queue: QueueDepthResponse,
}

impl From<PipelineStats> for StatsResponse {
    fn from(stats: PipelineStats) -> Self {
        let jobs = JobState::ALL
            .iter()
            .map(|state| (state.as_str().to_string(), stats.jobs.get(*state)))
            .collect();
        Self {
            jobs,
            total: stats.jobs.total(),
            queue: stats.queue.into(),
        }
    }
}

/// Health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` or `"degraded"`.
    pub status: String,
    /// Build version.
    pub version: String,
    /// Seconds since start.
    pub uptime_seconds: u64,
    /// Database backend status.
    pub database: String,
    /// Queue backend status.
    pub queue: String,
    /// Storage backend status.
    pub storage: String,
}
