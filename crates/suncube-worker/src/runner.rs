//! Worker pool: leases job ids from the queue and runs them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use suncube_core::config::WorkerConfig;
use suncube_core::error::ErrorKind;
use suncube_database::JobStore;
use suncube_entity::{
    Artifact, Job, JobError, JobErrorKind, JobEvent, JobEventKind, JobState, JobTransition,
};
use suncube_queue::{JobQueue, QueueLease};

use crate::events::EventPublisher;
use crate::executor::TaskExecutor;
use crate::retry::{RetryPolicy, release_retry};

/// Runs up to `concurrency` jobs at a time until cancelled.
///
/// Each delivered job id is claimed in the store with a compare-and-swap
/// `queued -> running` transition; a delivery whose claim fails (duplicate,
/// stale, or already finished) is acknowledged and dropped without running
/// the task.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    executor: Arc<TaskExecutor>,
    events: Arc<dyn EventPublisher>,
    policy: RetryPolicy,
    config: WorkerConfig,
    worker_id: String,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        executor: Arc<TaskExecutor>,
        events: Arc<dyn EventPublisher>,
        config: WorkerConfig,
    ) -> Self {
        let worker_id = format!("worker-{}", &Uuid::new_v4().simple().to_string()[..8]);
        if config.lease() <= config.task_timeout() {
            warn!(
                lease_seconds = config.lease_seconds,
                task_timeout_seconds = config.task_timeout_seconds,
                "Worker lease does not outlast the task timeout; running jobs may be reclaimed"
            );
        }
        Self {
            store,
            queue,
            executor,
            events,
            policy: RetryPolicy::from_config(&config),
            config,
            worker_id,
        }
    }

    /// Override the generated worker identifier.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// This pool's worker identifier.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until the cancel signal flips to `true`, then wait (bounded by
    /// `grace`) for in-flight jobs to finish.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>, grace: Duration) {
        let concurrency = self.config.concurrency.max(1);
        info!(
            worker_id = %self.worker_id,
            concurrency,
            poll_wait_ms = self.config.poll_wait_ms,
            queue = self.queue.provider_type(),
            "Worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();

        loop {
            if *cancel.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let lease = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                result = self.queue.dequeue(self.config.poll_wait()) => result,
            };

            match lease {
                Ok(Some(lease)) => {
                    let pool = self.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        pool.process(lease).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    debug!(worker_id = %self.worker_id, "No jobs available");
                }
                Err(e) => {
                    drop(permit);
                    error!(worker_id = %self.worker_id, error = %e, "Failed to dequeue job");
                    tokio::select! {
                        _ = cancel.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_wait()) => {}
                    }
                }
            }

            // Reap finished tasks so the set does not grow unbounded.
            while tasks.try_join_next().is_some() {}
        }

        info!(
            worker_id = %self.worker_id,
            in_flight = tasks.len(),
            "Worker pool stopping, waiting for in-flight jobs"
        );
        if tokio::time::timeout(grace, async { while tasks.join_next().await.is_some() {} })
            .await
            .is_err()
        {
            warn!(
                worker_id = %self.worker_id,
                "Grace period elapsed; abandoning in-flight jobs to the reaper"
            );
            tasks.abort_all();
        }
        info!(worker_id = %self.worker_id, "Worker pool shut down complete");
    }

    /// Handle one delivery end to end.
    pub async fn process(&self, lease: QueueLease) {
        let job_id = lease.job_id;
        let lease_until = Utc::now()
            + chrono::Duration::from_std(self.config.lease()).unwrap_or(chrono::Duration::seconds(90));

        let job = match self
            .store
            .transition(
                job_id,
                JobState::Queued,
                JobState::Running,
                JobTransition::claim(&self.worker_id, lease_until),
            )
            .await
        {
            Ok(job) => job,
            Err(e) if e.is_invalid_transition() || e.kind == ErrorKind::NotFound => {
                debug!(job_id = %job_id, reason = %e.message, "Dropping stale delivery");
                self.ack(&lease).await;
                return;
            }
            Err(e) => {
                // Leave the delivery unacknowledged so it is redelivered.
                error!(job_id = %job_id, error = %e, "Failed to claim job");
                return;
            }
        };

        self.events.publish(JobEvent::from_job(JobEventKind::Running, &job));
        info!(
            job_id = %job_id,
            worker_id = %self.worker_id,
            attempt = job.attempts + 1,
            max_attempts = job.max_attempts,
            "Processing job"
        );

        let outcome = match tokio::time::timeout(self.config.task_timeout(), self.executor.execute(&job)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::new(
                JobErrorKind::Timeout,
                format!("Task exceeded {}s timeout", self.config.task_timeout_seconds),
            )),
        };

        match outcome {
            Ok(artifact) => self.succeed(&job, artifact).await,
            Err(job_error) => self.fail(&job, job_error).await,
        }

        self.ack(&lease).await;
    }

    async fn succeed(&self, job: &Job, artifact: Artifact) {
        match self
            .store
            .transition(
                job.id,
                JobState::Running,
                JobState::Succeeded,
                JobTransition::succeed(artifact).fenced(job),
            )
            .await
        {
            Ok(done) => {
                info!(job_id = %job.id, attempts = done.attempts, "Job succeeded");
                self.events.publish(JobEvent::from_job(JobEventKind::Succeeded, &done));
            }
            Err(e) if e.is_invalid_transition() => {
                warn!(
                    job_id = %job.id,
                    worker_id = %self.worker_id,
                    reason = %e.message,
                    "Claim lost before completion; result discarded"
                );
            }
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to record job success"),
        }
    }

    async fn fail(&self, job: &Job, job_error: JobError) {
        let Some(delay) = self.policy.retry_delay(job, &job_error) else {
            self.dead_letter(job, job_error).await;
            return;
        };

        warn!(
            job_id = %job.id,
            attempt = job.attempts + 1,
            error = %job_error,
            retry_in_ms = delay.as_millis() as u64,
            "Job attempt failed, scheduling retry"
        );

        let retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let failed = match self
            .store
            .transition(
                job.id,
                JobState::Running,
                JobState::Failed,
                JobTransition::fail(job_error, retry_at).fenced(job),
            )
            .await
        {
            Ok(failed) => failed,
            Err(e) if e.is_invalid_transition() => {
                warn!(job_id = %job.id, "Lease lost before failure was recorded");
                return;
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to record job failure");
                return;
            }
        };
        self.events.publish(JobEvent::from_job(JobEventKind::RetryScheduled, &failed));

        // The reaper releases the job instead if this process stops first.
        let store = Arc::clone(&self.store);
        let queue = Arc::clone(&self.queue);
        let events = Arc::clone(&self.events);
        let job_id = job.id;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = release_retry(&store, &queue, &events, job_id).await {
                error!(job_id = %job_id, error = %e, "Failed to release job for retry");
            }
        });
    }

    async fn dead_letter(&self, job: &Job, job_error: JobError) {
        error!(
            job_id = %job.id,
            attempt = job.attempts + 1,
            error = %job_error,
            "Job failed permanently"
        );
        match self
            .store
            .transition(
                job.id,
                JobState::Running,
                JobState::DeadLettered,
                JobTransition::dead_letter(job_error, true).fenced(job),
            )
            .await
        {
            Ok(dead) => self.events.publish(JobEvent::from_job(JobEventKind::DeadLettered, &dead)),
            Err(e) if e.is_invalid_transition() => {
                warn!(job_id = %job.id, "Lease lost before dead-lettering");
            }
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to dead-letter job"),
        }
    }

    async fn ack(&self, lease: &QueueLease) {
        match self.queue.ack(lease).await {
            Ok(true) => {}
            Ok(false) => debug!(job_id = %lease.job_id, "Queue lease expired before ack"),
            Err(e) => warn!(job_id = %lease.job_id, error = %e, "Failed to ack queue lease"),
        }
    }
}
