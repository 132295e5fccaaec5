//! Retry decisions, backoff, and the release of failed jobs back to the queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use suncube_core::config::WorkerConfig;
use suncube_core::result::AppResult;
use suncube_core::types::JobId;
use suncube_database::JobStore;
use suncube_entity::{Job, JobError, JobEvent, JobEventKind, JobState, JobTransition};
use suncube_queue::JobQueue;

use crate::events::EventPublisher;

/// Exponential backoff with a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
}

impl RetryPolicy {
    /// Create a policy whose first retry waits `base` and no retry waits longer than `cap`.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Policy from the worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_cap_ms),
        )
    }

    /// Delay before the next run after `attempts` concluded attempts:
    /// `min(base * 2^(attempts - 1), cap)`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }

    /// Delay before retrying `job` after its current attempt failed with
    /// `error`, or `None` when the job must be dead-lettered.
    ///
    /// `job` is the record as claimed, before the failed attempt is counted.
    pub fn retry_delay(&self, job: &Job, error: &JobError) -> Option<Duration> {
        let concluded = job.attempts + 1;
        (error.is_retryable() && concluded < job.max_attempts).then(|| self.delay_for(concluded))
    }
}

/// Move a failed job back to `queued` and enqueue it.
///
/// Returns `false` when the job was no longer `failed` (another releaser got
/// there first).
pub async fn release_retry(
    store: &Arc<dyn JobStore>,
    queue: &Arc<dyn JobQueue>,
    events: &Arc<dyn EventPublisher>,
    job_id: JobId,
) -> AppResult<bool> {
    let job = match store
        .transition(job_id, JobState::Failed, JobState::Queued, JobTransition::release())
        .await
    {
        Ok(job) => job,
        Err(e) if e.is_invalid_transition() => {
            debug!(job_id = %job_id, "Retry already released");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    queue.enqueue(job_id).await?;
    events.publish(JobEvent::from_job(JobEventKind::Requeued, &job));
    info!(job_id = %job_id, attempts = job.attempts, "Released job for retry");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use suncube_entity::{JobErrorKind, NewJob, TaskType};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(500), Duration::from_secs(4))
    }

    fn job(attempts: u32, max_attempts: u32) -> Job {
        let mut job = Job::queued(
            NewJob {
                idempotency_key: "k".to_string(),
                task_type: TaskType::GenerateInvoice,
                payload: serde_json::json!({}),
                max_attempts,
            },
            Utc::now(),
        );
        job.attempts = attempts;
        job.state = JobState::Running;
        job
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
        assert_eq!(p.delay_for(5), Duration::from_secs(4));
        assert_eq!(p.delay_for(200), Duration::from_secs(4));
    }

    #[test]
    fn test_transient_error_retries_while_attempts_remain() {
        let p = policy();
        let err = JobError::new(JobErrorKind::Storage, "s3 unavailable");
        assert_eq!(p.retry_delay(&job(0, 3), &err), Some(Duration::from_millis(500)));
        assert_eq!(p.retry_delay(&job(1, 3), &err), Some(Duration::from_secs(1)));
        assert_eq!(p.retry_delay(&job(2, 3), &err), None);
    }

    #[test]
    fn test_permanent_error_never_retries() {
        let err = JobError::new(JobErrorKind::PaymentNotFound, "no such payment");
        assert_eq!(policy().retry_delay(&job(0, 3), &err), None);
    }
}
