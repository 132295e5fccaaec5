//! Periodic recovery of abandoned and due jobs.
//!
//! Each sweep:
//! 1. reclaims `running` jobs whose worker lease expired, counting the lost
//!    attempt and either re-queuing or dead-lettering them;
//! 2. releases `failed` jobs whose backoff has elapsed but which were never
//!    re-queued (for example because the process that scheduled the retry
//!    stopped);
//! 3. pushes `queued` jobs that have not moved for the stall threshold back
//!    onto the queue, covering a job whose state was committed but whose
//!    enqueue failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use suncube_core::error::AppError;
use suncube_database::JobStore;
use suncube_entity::{Job, JobError, JobErrorKind, JobEvent, JobEventKind, JobState, JobTransition};
use suncube_queue::JobQueue;

use crate::events::EventPublisher;
use crate::retry::release_retry;

/// Jobs examined per store query.
const BATCH_SIZE: u32 = 100;

/// Default age after which an unclaimed queued job is enqueued again.
const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(300);

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired leases put back on the queue.
    pub requeued: u32,
    /// Expired leases with no attempts left.
    pub dead_lettered: u32,
    /// Failed jobs released after their backoff.
    pub released: u32,
    /// Stalled queued jobs pushed onto the queue again.
    pub resubmitted: u32,
}

/// Reclaims expired leases and releases due retries on an interval.
#[derive(Debug, Clone)]
pub struct Reaper {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    events: Arc<dyn EventPublisher>,
    interval: Duration,
    stall_threshold: Duration,
}

impl Reaper {
    /// Create a new reaper sweeping every `interval`.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        events: Arc<dyn EventPublisher>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            events,
            interval,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
        }
    }

    /// Enqueue again any queued job untouched for `threshold`.
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Sweep on the configured interval until cancelled.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Reaper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) if report != SweepReport::default() => {
                            info!(
                                requeued = report.requeued,
                                dead_lettered = report.dead_lettered,
                                released = report.released,
                                resubmitted = report.resubmitted,
                                "Reaper sweep completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Reaper sweep failed"),
                    }
                }
            }
        }
        info!("Reaper stopped");
    }

    /// Run one sweep as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let mut report = SweepReport::default();

        loop {
            let expired = self.store.find_expired_leases(now, BATCH_SIZE).await?;
            let mut progressed = false;
            for job in &expired {
                match self.reclaim(job).await {
                    Ok(Some(JobState::Queued)) => {
                        report.requeued += 1;
                        progressed = true;
                    }
                    Ok(Some(_)) => {
                        report.dead_lettered += 1;
                        progressed = true;
                    }
                    Ok(None) => {}
                    Err(e) => error!(job_id = %job.id, error = %e, "Failed to reclaim job"),
                }
            }
            if (expired.len() as u32) < BATCH_SIZE || !progressed {
                break;
            }
        }

        loop {
            let due = self.store.find_due_retries(now, BATCH_SIZE).await?;
            let mut progressed = false;
            for job in &due {
                match release_retry(&self.store, &self.queue, &self.events, job.id).await {
                    Ok(true) => {
                        report.released += 1;
                        progressed = true;
                    }
                    Ok(false) => {}
                    Err(e) => error!(job_id = %job.id, error = %e, "Failed to release job"),
                }
            }
            if (due.len() as u32) < BATCH_SIZE || !progressed {
                break;
            }
        }

        report.resubmitted = self.resubmit_stalled(now).await?;

        Ok(report)
    }

    /// Enqueue queued jobs that no worker has picked up within the stall
    /// threshold. Enqueue is idempotent per job id, so a job that is merely
    /// waiting behind a backlog is not duplicated.
    async fn resubmit_stalled(&self, now: DateTime<Utc>) -> Result<u32, AppError> {
        let threshold = chrono::Duration::from_std(self.stall_threshold)
            .unwrap_or(chrono::Duration::seconds(300));
        let stalled = self
            .store
            .find_stalled_queued(now - threshold, BATCH_SIZE)
            .await?;

        let mut resubmitted = 0;
        for job in &stalled {
            match self.queue.enqueue(job.id).await {
                Ok(()) => {
                    resubmitted += 1;
                    warn!(
                        job_id = %job.id,
                        queued_since = %job.updated_at,
                        "Re-enqueued stalled job"
                    );
                }
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to re-enqueue stalled job"),
            }
        }
        Ok(resubmitted)
    }

    /// Reclaim one expired lease. Returns the new state, or `None` when the
    /// worker concluded the job first.
    async fn reclaim(&self, job: &Job) -> Result<Option<JobState>, AppError> {
        let error = JobError::new(
            JobErrorKind::LeaseExpired,
            format!(
                "Lease held by {} expired",
                job.worker_id.as_deref().unwrap_or("unknown worker")
            ),
        );
        let (to, changes) = if job.attempts + 1 < job.max_attempts {
            (JobState::Queued, JobTransition::reclaim(error).fenced(job))
        } else {
            (JobState::DeadLettered, JobTransition::dead_letter(error, true).fenced(job))
        };

        let updated = match self.store.transition(job.id, JobState::Running, to, changes).await {
            Ok(updated) => updated,
            Err(e) if e.is_invalid_transition() => return Ok(None),
            Err(e) => return Err(e),
        };

        if to == JobState::Queued {
            self.queue.enqueue(job.id).await?;
            warn!(job_id = %job.id, attempts = updated.attempts, "Reclaimed job with expired lease");
            self.events.publish(JobEvent::from_job(JobEventKind::Requeued, &updated));
        } else {
            warn!(job_id = %job.id, attempts = updated.attempts, "Expired lease exhausted attempts");
            self.events.publish(JobEvent::from_job(JobEventKind::DeadLettered, &updated));
        }
        Ok(Some(to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use suncube_core::result::AppResult;
    use suncube_core::types::JobId;
    use suncube_database::memory::MemoryJobStore;
    use suncube_entity::{NewJob, TaskType};
    use suncube_queue::memory::MemoryJobQueue;
    use suncube_queue::{QueueDepth, QueueLease};

    use crate::events::BroadcastEventBus;

    /// Memory queue whose enqueue can be switched off.
    #[derive(Debug)]
    struct Outage {
        inner: MemoryJobQueue,
        down: AtomicBool,
    }

    impl Outage {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryJobQueue::new(Duration::from_secs(120)),
                down: AtomicBool::new(false),
            })
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl JobQueue for Outage {
        fn provider_type(&self) -> &str {
            "outage"
        }

        async fn enqueue(&self, job_id: JobId) -> AppResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(AppError::queue("queue unavailable"));
            }
            self.inner.enqueue(job_id).await
        }

        async fn dequeue(&self, wait: Duration) -> AppResult<Option<QueueLease>> {
            self.inner.dequeue(wait).await
        }

        async fn ack(&self, lease: &QueueLease) -> AppResult<bool> {
            self.inner.ack(lease).await
        }

        async fn depth(&self) -> AppResult<QueueDepth> {
            self.inner.depth().await
        }

        async fn health_check(&self) -> AppResult<bool> {
            Ok(!self.down.load(Ordering::SeqCst))
        }
    }

    struct Harness {
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        events: Arc<dyn EventPublisher>,
        reaper: Reaper,
    }

    fn harness() -> Harness {
        harness_on(Arc::new(MemoryJobQueue::new(Duration::from_secs(120))))
    }

    fn harness_on(queue: Arc<dyn JobQueue>) -> Harness {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let events: Arc<dyn EventPublisher> = Arc::new(BroadcastEventBus::default());
        let reaper = Reaper::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&events),
            Duration::from_secs(15),
        )
        .with_stall_threshold(Duration::from_secs(60));
        Harness {
            store,
            queue,
            events,
            reaper,
        }
    }

    /// A running job whose lease ended a minute ago.
    async fn abandoned(h: &Harness, key: &str, max_attempts: u32) -> JobId {
        let job = h
            .store
            .create(NewJob {
                idempotency_key: key.to_string(),
                task_type: TaskType::GenerateInvoice,
                payload: serde_json::json!({}),
                max_attempts,
            })
            .await
            .unwrap();
        h.store
            .transition(
                job.id,
                JobState::Queued,
                JobState::Running,
                JobTransition::claim("crashed-worker", Utc::now() - chrono::Duration::seconds(60)),
            )
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_expired_lease_is_requeued_with_attempt_counted() {
        let h = harness();
        let job_id = abandoned(&h, "a", 3).await;

        let report = h.reaper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.requeued, 1);

        let job = h.store.get(job_id).await.unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error.unwrap().kind, JobErrorKind::LeaseExpired);

        let lease = h.queue.dequeue(Duration::from_millis(20)).await.unwrap().unwrap();
        assert_eq!(lease.job_id, job_id);
    }

    #[tokio::test]
    async fn test_expired_lease_without_attempts_left_is_dead_lettered() {
        let h = harness();
        let job_id = abandoned(&h, "b", 1).await;

        let report = h.reaper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.dead_lettered, 1);

        let job = h.store.get(job_id).await.unwrap();
        assert_eq!(job.state, JobState::DeadLettered);
        assert_eq!(job.attempts, 1);
        assert_eq!(h.queue.depth().await.unwrap().ready, 0);
    }

    #[tokio::test]
    async fn test_live_lease_is_left_alone() {
        let h = harness();
        let job_id = abandoned(&h, "c", 3).await;

        let report = h
            .reaper
            .sweep(Utc::now() - chrono::Duration::seconds(120))
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(h.store.get(job_id).await.unwrap().state, JobState::Running);
    }

    #[tokio::test]
    async fn test_due_retry_is_released() {
        let h = harness();
        let job_id = abandoned(&h, "d", 3).await;
        h.store
            .transition(
                job_id,
                JobState::Running,
                JobState::Failed,
                JobTransition::fail(
                    JobError::new(JobErrorKind::Render, "boom"),
                    Utc::now() - chrono::Duration::seconds(1),
                ),
            )
            .await
            .unwrap();

        let report = h.reaper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.released, 1);
        assert_eq!(h.store.get(job_id).await.unwrap().state, JobState::Queued);
        assert_eq!(h.queue.depth().await.unwrap().ready, 1);

        // A second sweep finds nothing to do.
        let report = h.reaper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_reclaim_with_failed_enqueue_is_resubmitted_later() {
        let outage = Outage::new();
        let h = harness_on(outage.clone());
        let job_id = abandoned(&h, "e", 3).await;

        outage.set_down(true);
        let report = h.reaper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.requeued, 0);
        assert_eq!(h.store.get(job_id).await.unwrap().state, JobState::Queued);
        assert_eq!(h.queue.depth().await.unwrap().ready, 0);

        outage.set_down(false);
        let report = h
            .reaper
            .sweep(Utc::now() + chrono::Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(report.resubmitted, 1);

        let lease = h.queue.dequeue(Duration::from_millis(20)).await.unwrap().unwrap();
        assert_eq!(lease.job_id, job_id);
    }

    #[tokio::test]
    async fn test_released_retry_with_failed_enqueue_is_resubmitted_later() {
        let outage = Outage::new();
        let h = harness_on(outage.clone());
        let job_id = abandoned(&h, "f", 3).await;
        let running = h.store.get(job_id).await.unwrap();
        h.store
            .transition(
                job_id,
                JobState::Running,
                JobState::Failed,
                JobTransition::fail(JobError::new(JobErrorKind::Storage, "s3"), Utc::now())
                    .fenced(&running),
            )
            .await
            .unwrap();

        outage.set_down(true);
        let err = release_retry(&h.store, &h.queue, &h.events, job_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, suncube_core::error::ErrorKind::Queue);
        assert_eq!(h.store.get(job_id).await.unwrap().state, JobState::Queued);

        // Not yet stalled.
        outage.set_down(false);
        let report = h.reaper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(h.queue.depth().await.unwrap().ready, 0);

        let report = h
            .reaper
            .sweep(Utc::now() + chrono::Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(report.resubmitted, 1);
        assert_eq!(h.queue.depth().await.unwrap().ready, 1);
    }
}
