//! Field updates that accompany a compare-and-swap state transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::error::AppError;

use super::error::JobError;
use super::model::Job;
use super::state::JobState;
use crate::artifact::Artifact;

/// Changes applied to a job together with a state transition.
///
/// Stores validate the transition with [`JobTransition::check`] and then
/// apply it atomically with respect to other writers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobTransition {
    /// Count the attempt that just concluded.
    pub increment_attempts: bool,
    /// Result to record.
    pub result: Option<Artifact>,
    /// Error to record.
    pub error: Option<JobError>,
    /// Worker claiming the job.
    pub worker_id: Option<String>,
    /// New lease deadline (only meaningful when entering `running`).
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Earliest retry time (only meaningful when entering `failed`).
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Claim the job must still be under for the transition to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_by: Option<Claim>,
}

/// One claim of a running job.
///
/// Every exit from `running` counts an attempt, so the attempt counter
/// together with the worker id identifies a single claim even when the same
/// worker claims the job again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Worker that holds the claim.
    pub worker_id: Option<String>,
    /// Attempts concluded before the claim began.
    pub attempts: u32,
}

impl Claim {
    /// The claim `job` is currently under.
    pub fn of(job: &Job) -> Self {
        Self {
            worker_id: job.worker_id.clone(),
            attempts: job.attempts,
        }
    }
}

impl JobTransition {
    /// A worker claims a queued job until `lease_until`.
    pub fn claim(worker_id: impl Into<String>, lease_until: DateTime<Utc>) -> Self {
        Self {
            worker_id: Some(worker_id.into()),
            lease_expires_at: Some(lease_until),
            ..Self::default()
        }
    }

    /// The attempt produced `artifact`.
    pub fn succeed(artifact: Artifact) -> Self {
        Self {
            increment_attempts: true,
            result: Some(artifact),
            ..Self::default()
        }
    }

    /// The attempt failed; retry no earlier than `retry_at`.
    pub fn fail(error: JobError, retry_at: DateTime<Utc>) -> Self {
        Self {
            increment_attempts: true,
            error: Some(error),
            next_attempt_at: Some(retry_at),
            ..Self::default()
        }
    }

    /// Give up on the job. `counts_attempt` is false when leaving `failed`,
    /// whose attempt was already counted.
    pub fn dead_letter(error: JobError, counts_attempt: bool) -> Self {
        Self {
            increment_attempts: counts_attempt,
            error: Some(error),
            ..Self::default()
        }
    }

    /// Reaper reclaims a running job whose lease ran out.
    pub fn reclaim(error: JobError) -> Self {
        Self {
            increment_attempts: true,
            error: Some(error),
            ..Self::default()
        }
    }

    /// A failed job's backoff elapsed; make it runnable again.
    pub fn release() -> Self {
        Self::default()
    }

    /// Only apply while the job is still under the claim `job` was read with.
    pub fn fenced(mut self, job: &Job) -> Self {
        self.held_by = Some(Claim::of(job));
        self
    }

    /// Validate `from -> to` against the current job.
    pub fn check(&self, job: &Job, from: JobState, to: JobState) -> Result<(), AppError> {
        if !from.can_transition_to(to) {
            return Err(AppError::invalid_transition(format!(
                "{from} -> {to} is not a valid job transition"
            )));
        }
        if job.state != from {
            return Err(AppError::invalid_transition(format!(
                "job {} is {} (expected {from})",
                job.id, job.state
            )));
        }
        if let Some(claim) = &self.held_by {
            if *claim != Claim::of(job) {
                return Err(AppError::invalid_transition(format!(
                    "job {} is no longer held by {} (attempt {})",
                    job.id,
                    claim.worker_id.as_deref().unwrap_or("unknown worker"),
                    claim.attempts + 1
                )));
            }
        }
        let attempts = job.attempts + u32::from(self.increment_attempts);
        if attempts > job.max_attempts {
            return Err(AppError::invalid_transition(format!(
                "job {} would exceed max attempts ({attempts} > {})",
                job.id, job.max_attempts
            )));
        }
        if matches!(to, JobState::Queued | JobState::Failed) && attempts >= job.max_attempts {
            return Err(AppError::invalid_transition(format!(
                "job {} has no attempts left to retry",
                job.id
            )));
        }
        Ok(())
    }

    /// Apply the transition to an in-memory job (after [`check`](Self::check)).
    pub fn apply(self, job: &mut Job, to: JobState, now: DateTime<Utc>) {
        if self.increment_attempts {
            job.attempts += 1;
        }
        match to {
            JobState::Running => {
                job.started_at = Some(now);
                job.lease_expires_at = self.lease_expires_at;
                job.worker_id = self.worker_id.or(job.worker_id.take());
                job.next_attempt_at = None;
            }
            JobState::Succeeded => {
                job.result = self.result;
                job.error = None;
                job.lease_expires_at = None;
                job.completed_at = Some(now);
            }
            JobState::Failed => {
                job.error = self.error.or(job.error.take());
                job.lease_expires_at = None;
                job.next_attempt_at = self.next_attempt_at;
            }
            JobState::Queued => {
                if self.error.is_some() {
                    job.error = self.error;
                }
                job.lease_expires_at = None;
                job.next_attempt_at = None;
            }
            JobState::DeadLettered => {
                job.error = self.error.or(job.error.take());
                job.lease_expires_at = None;
                job.next_attempt_at = None;
                job.completed_at = Some(now);
            }
        }
        job.state = to;
        job.updated_at = now;
    }
}
