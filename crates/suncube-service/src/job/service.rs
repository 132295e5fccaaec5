//! Job submission, status polling and artifact links.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use suncube_core::error::{AppError, ErrorKind};
use suncube_core::result::AppResult;
use suncube_core::traits::storage::ObjectStore;
use suncube_core::types::{JobId, PaymentId};
use suncube_database::{AuditSink, JobStore};
use suncube_entity::audit::NewAuditEntry;
use suncube_entity::job::GenerateInvoicePayload;
use suncube_entity::{Job, JobEvent, JobEventKind, JobState, NewJob, TaskType};
use suncube_queue::JobQueue;
use suncube_worker::EventPublisher;

use super::types::{ArtifactLink, JobStatus, PipelineStats, Submission};
use crate::context::RequestContext;

/// Audit action recorded for every accepted invoice request.
pub const GENERATE_INVOICE_ACTION: &str = "GENERATE_INVOICE";

/// Audit resource type for invoice requests, keyed by payment ID.
pub const INVOICE_RESOURCE_TYPE: &str = "payments";

/// Largest page served by [`JobService::list_recent`].
const MAX_LIST_LIMIT: u32 = 100;

/// Accepts jobs, reports their state and hands out artifact links.
///
/// Submission is idempotent per key: while a live job holds the key, every
/// submit returns that job instead of creating another.
#[derive(Debug, Clone)]
pub struct JobService {
    /// Job records.
    store: Arc<dyn JobStore>,
    /// Delivery to workers.
    queue: Arc<dyn JobQueue>,
    /// Artifact storage, for signing download URLs.
    objects: Arc<dyn ObjectStore>,
    /// Audit trail for accepted requests.
    audit: Arc<dyn AuditSink>,
    /// Lifecycle event sink.
    events: Arc<dyn EventPublisher>,
    /// Attempt ceiling given to new jobs.
    max_attempts: u32,
    /// Lifetime of issued download URLs.
    url_ttl: Duration,
}

impl JobService {
    /// Creates a new job service.
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        objects: Arc<dyn ObjectStore>,
        audit: Arc<dyn AuditSink>,
        events: Arc<dyn EventPublisher>,
        max_attempts: u32,
        url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            objects,
            audit,
            events,
            max_attempts: max_attempts.max(1),
            url_ttl,
        }
    }

    /// Requests an invoice for a payment.
    ///
    /// The payment id is the idempotency key, in canonical UUID form so that
    /// differently cased spellings of one id share a job.
    pub async fn submit_invoice(
        &self,
        ctx: &RequestContext,
        payment_id: &str,
    ) -> Result<Submission, AppError> {
        let payment_id = parse_payment_id(payment_id)?;
        let payload = serde_json::to_value(GenerateInvoicePayload { payment_id }).map_err(|e| {
            AppError::with_source(ErrorKind::Serialization, "Failed to encode job payload", e)
        })?;

        let key = payment_id.to_string();
        let submission = self
            .submit(TaskType::GenerateInvoice, payload, key.clone())
            .await?;
        self.audit_submission(ctx, &key, &submission).await;
        Ok(submission)
    }

    /// Submits a job under `idempotency_key`, or returns the live job that
    /// already holds the key.
    pub async fn submit(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        idempotency_key: String,
    ) -> Result<Submission, AppError> {
        if idempotency_key.trim().is_empty() {
            return Err(AppError::validation("Idempotency key must not be empty"));
        }

        if let Some(existing) = self.find_live(&idempotency_key).await? {
            return Ok(self.deduplicated(existing).await);
        }

        let created = self
            .store
            .create(NewJob {
                idempotency_key: idempotency_key.clone(),
                task_type,
                payload,
                max_attempts: self.max_attempts,
            })
            .await;

        match created {
            Ok(job) => {
                info!(
                    job_id = %job.id,
                    task_type = %job.task_type,
                    idempotency_key = %job.idempotency_key,
                    "Job submitted"
                );
                self.events.publish(JobEvent::from_job(JobEventKind::Queued, &job));
                if let Err(e) = self.queue.enqueue(job.id).await {
                    warn!(job_id = %job.id, error = %e, "Failed to enqueue new job");
                }
                Ok(Submission {
                    job,
                    deduplicated: false,
                })
            }
            // Lost the race against a concurrent submit of the same key.
            Err(e) if e.kind == ErrorKind::Conflict => {
                let existing = self.store.find_by_idempotency_key(&idempotency_key).await?;
                Ok(self.deduplicated(existing).await)
            }
            Err(e) => Err(e),
        }
    }

    /// Current status of a job.
    pub async fn get_status(&self, job_id: JobId) -> Result<JobStatus, AppError> {
        Ok(self.store.get(job_id).await?.into())
    }

    /// Status of the most recent job submitted under `idempotency_key`.
    pub async fn get_status_by_key(&self, idempotency_key: &str) -> Result<JobStatus, AppError> {
        Ok(self
            .store
            .find_by_idempotency_key(idempotency_key)
            .await?
            .into())
    }

    /// Status of the most recent invoice job for a payment.
    pub async fn get_invoice_status(&self, payment_id: &str) -> Result<JobStatus, AppError> {
        let payment_id = parse_payment_id(payment_id)?;
        self.get_status_by_key(&payment_id.to_string()).await
    }

    /// Download link for a succeeded job's artifact.
    ///
    /// Fails with `NotFound` for an unknown job and `NotReady` for any job
    /// that has not succeeded.
    pub async fn get_artifact_url(&self, job_id: JobId) -> Result<ArtifactLink, AppError> {
        let job = self.store.get(job_id).await?;
        if job.state != JobState::Succeeded {
            return Err(AppError::not_ready(format!(
                "Job {job_id} is {}, artifact not available",
                job.state
            )));
        }
        let artifact = job.result.ok_or_else(|| {
            AppError::internal(format!("Succeeded job {job_id} has no artifact"))
        })?;

        let signed = self
            .objects
            .signed_url(&artifact.storage_key, self.url_ttl)
            .await?;
        debug!(job_id = %job_id, key = %artifact.storage_key, "Issued artifact URL");

        Ok(ArtifactLink {
            job_id,
            storage_key: artifact.storage_key,
            url: signed.url,
            expires_at: signed.expires_at,
        })
    }

    /// Most recently created jobs, newest first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<JobStatus>, AppError> {
        let jobs = self
            .store
            .list_recent(limit.clamp(1, MAX_LIST_LIMIT))
            .await?;
        Ok(jobs.into_iter().map(JobStatus::from).collect())
    }

    /// Per-state job counts and queue depth.
    pub async fn stats(&self) -> Result<PipelineStats, AppError> {
        let jobs = self.store.count_by_state().await?;
        let queue = self.queue.depth().await?;
        Ok(PipelineStats { jobs, queue })
    }

    async fn find_live(&self, key: &str) -> AppResult<Option<Job>> {
        match self.store.find_by_idempotency_key(key).await {
            Ok(job) if job.state.is_live() => Ok(Some(job)),
            Ok(_) => Ok(None),
            Err(e) if e.kind == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Return an existing job, putting a still-queued one back on the queue
    /// in case its first enqueue was lost. The queue ignores ids already
    /// waiting and the claim rejects duplicate deliveries.
    async fn deduplicated(&self, job: Job) -> Submission {
        if job.state == JobState::Queued {
            if let Err(e) = self.queue.enqueue(job.id).await {
                warn!(job_id = %job.id, error = %e, "Failed to re-enqueue queued job");
            }
        }
        debug!(job_id = %job.id, state = %job.state, "Returning existing job for idempotency key");
        Submission {
            job,
            deduplicated: true,
        }
    }

    async fn audit_submission(&self, ctx: &RequestContext, payment_id: &str, s: &Submission) {
        let entry = NewAuditEntry {
            actor: ctx.actor.clone(),
            action: GENERATE_INVOICE_ACTION.to_string(),
            resource_type: INVOICE_RESOURCE_TYPE.to_string(),
            resource_id: payment_id.to_string(),
            meta: serde_json::json!({
                "job_id": s.job.id,
                "deduplicated": s.deduplicated,
            }),
        };
        if let Err(e) = self.audit.record(entry).await {
            warn!(payment_id, job_id = %s.job.id, error = %e, "Failed to write audit entry");
        }
    }
}

fn parse_payment_id(raw: &str) -> AppResult<PaymentId> {
    let raw = raw.trim();
    raw.parse()
        .map_err(|_| AppError::validation(format!("paymentId must be a UUID, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use suncube_database::memory::{MemoryAuditLog, MemoryJobStore};
    use suncube_entity::audit::AuditEntry;
    use suncube_entity::{Artifact, JobError, JobErrorKind, JobTransition};
    use suncube_queue::memory::MemoryJobQueue;
    use suncube_storage::providers::MemoryObjectStore;
    use suncube_worker::BroadcastEventBus;

    struct Harness {
        service: JobService,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        audit: MemoryAuditLog,
        bus: Arc<BroadcastEventBus>,
        objects: Arc<MemoryObjectStore>,
    }

    fn harness() -> Harness {
        harness_with_audit(None)
    }

    fn harness_with_audit(audit_override: Option<Arc<dyn AuditSink>>) -> Harness {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new(Duration::from_secs(120)));
        let audit = MemoryAuditLog::new();
        let bus = Arc::new(BroadcastEventBus::default());
        let objects = Arc::new(MemoryObjectStore::new("http://localhost:3000", "test-secret"));
        let service = JobService::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            objects.clone(),
            audit_override.unwrap_or_else(|| Arc::new(audit.clone())),
            bus.clone(),
            3,
            Duration::from_secs(3600),
        );
        Harness {
            service,
            store,
            queue,
            audit,
            bus,
            objects,
        }
    }

    #[derive(Debug)]
    struct BrokenAudit;

    #[async_trait]
    impl AuditSink for BrokenAudit {
        async fn record(&self, _entry: NewAuditEntry) -> AppResult<AuditEntry> {
            Err(AppError::database("audit table unavailable"))
        }

        async fn find_by_resource(&self, _: &str, _: &str) -> AppResult<Vec<AuditEntry>> {
            Ok(Vec::new())
        }
    }

    async fn run_to(h: &Harness, job_id: JobId, to: JobState, payment_id: PaymentId) {
        h.store
            .transition(
                job_id,
                JobState::Queued,
                JobState::Running,
                JobTransition::claim("w1", Utc::now() + chrono::Duration::seconds(60)),
            )
            .await
            .unwrap();
        let changes = match to {
            JobState::Succeeded => JobTransition::succeed(Artifact {
                storage_key: format!("invoices/c/{payment_id}.pdf"),
                payment_id,
                content_type: "application/pdf".to_string(),
                size_bytes: 4,
            }),
            JobState::DeadLettered => JobTransition::dead_letter(
                JobError::new(JobErrorKind::PaymentNotFound, "missing"),
                true,
            ),
            other => panic!("unsupported target {other}"),
        };
        h.store
            .transition(job_id, JobState::Running, to, changes)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_creates_queued_job() {
        let h = harness();
        let mut events = h.bus.subscribe();
        let payment_id = PaymentId::new();

        let s = h
            .service
            .submit_invoice(&RequestContext::system(), &payment_id.to_string())
            .await
            .unwrap();

        assert!(!s.deduplicated);
        assert_eq!(s.job.state, JobState::Queued);
        assert_eq!(s.job.attempts, 0);
        assert_eq!(s.job.max_attempts, 3);
        assert_eq!(s.job.idempotency_key, payment_id.to_string());
        assert_eq!(h.queue.depth().await.unwrap().ready, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, JobEventKind::Queued);
        assert_eq!(event.job_id, s.job.id);
    }

    #[tokio::test]
    async fn test_repeat_submit_returns_same_job() {
        let h = harness();
        let id = PaymentId::new().to_string();
        let ctx = RequestContext::system();

        let first = h.service.submit_invoice(&ctx, &id).await.unwrap();
        let second = h
            .service
            .submit_invoice(&ctx, &id.to_uppercase())
            .await
            .unwrap();

        assert!(second.deduplicated);
        assert_eq!(first.job.id, second.job.id);
        assert_eq!(h.store.count_by_state().await.unwrap().total(), 1);
        assert_eq!(h.queue.depth().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_concurrent_submits_create_one_job() {
        let h = harness();
        let id = PaymentId::new().to_string();
        let ctx = RequestContext::system();

        let results = futures::future::join_all(
            (0..16).map(|_| h.service.submit_invoice(&ctx, &id)),
        )
        .await;

        let ids: std::collections::HashSet<JobId> =
            results.into_iter().map(|r| r.unwrap().job.id).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(h.store.count_by_state().await.unwrap().total(), 1);
        assert_eq!(h.audit.entries().await.len(), 16);
    }

    #[tokio::test]
    async fn test_invalid_payment_id_is_rejected() {
        let h = harness();
        for bad in ["", "pay-123", "not a uuid"] {
            let err = h
                .service
                .submit_invoice(&RequestContext::system(), bad)
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "input {bad:?}");
        }
        assert_eq!(h.store.count_by_state().await.unwrap().total(), 0);
        assert!(h.audit.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_dead_lettered_key_can_be_resubmitted() {
        let h = harness();
        let payment_id = PaymentId::new();
        let ctx = RequestContext::system();

        let first = h
            .service
            .submit_invoice(&ctx, &payment_id.to_string())
            .await
            .unwrap();
        run_to(&h, first.job.id, JobState::DeadLettered, payment_id).await;

        let second = h
            .service
            .submit_invoice(&ctx, &payment_id.to_string())
            .await
            .unwrap();
        assert!(!second.deduplicated);
        assert_ne!(first.job.id, second.job.id);

        let latest = h
            .service
            .get_invoice_status(&payment_id.to_string())
            .await
            .unwrap();
        assert_eq!(latest.job_id, second.job.id);
        assert_eq!(latest.state, JobState::Queued);
    }

    #[tokio::test]
    async fn test_queued_job_is_re_enqueued_on_duplicate_submit() {
        let h = harness();
        let id = PaymentId::new().to_string();
        let ctx = RequestContext::system();

        let s = h.service.submit_invoice(&ctx, &id).await.unwrap();
        // Simulate a delivery lost before any worker claimed the job.
        let lease = h.queue.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(h.queue.ack(&lease).await.unwrap());
        assert_eq!(h.queue.depth().await.unwrap().ready, 0);

        let again = h.service.submit_invoice(&ctx, &id).await.unwrap();
        assert_eq!(again.job.id, s.job.id);
        assert_eq!(h.queue.depth().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_status_of_unknown_job_is_not_found() {
        let h = harness();
        let err = h.service.get_status(JobId::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = h.service.get_artifact_url(JobId::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_artifact_url_not_ready_until_succeeded() {
        let h = harness();
        let payment_id = PaymentId::new();
        let s = h
            .service
            .submit_invoice(&RequestContext::system(), &payment_id.to_string())
            .await
            .unwrap();

        let err = h.service.get_artifact_url(s.job.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotReady);

        run_to(&h, s.job.id, JobState::Succeeded, payment_id).await;
        h.objects
            .put(
                &format!("invoices/c/{payment_id}.pdf"),
                Bytes::from_static(b"%PDF"),
                "application/pdf",
            )
            .await
            .unwrap();

        let link = h.service.get_artifact_url(s.job.id).await.unwrap();
        assert_eq!(link.storage_key, format!("invoices/c/{payment_id}.pdf"));
        assert!(link
            .url
            .starts_with(&format!("http://localhost:3000/artifacts/invoices/c/{payment_id}.pdf?token=")));
        assert!(link.expires_at > Utc::now());

        let status = h.service.get_status(s.job.id).await.unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.attempts, 1);
    }

    #[tokio::test]
    async fn test_dead_lettered_artifact_is_not_ready() {
        let h = harness();
        let payment_id = PaymentId::new();
        let s = h
            .service
            .submit_invoice(&RequestContext::system(), &payment_id.to_string())
            .await
            .unwrap();
        run_to(&h, s.job.id, JobState::DeadLettered, payment_id).await;

        let err = h.service.get_artifact_url(s.job.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotReady);
        let status = h.service.get_status(s.job.id).await.unwrap();
        assert_eq!(status.error.unwrap().kind, JobErrorKind::PaymentNotFound);
    }

    #[tokio::test]
    async fn test_submit_is_audited() {
        let h = harness();
        let payment_id = PaymentId::new().to_string();
        let ctx = RequestContext::new(Some("ops@suncube.example".to_string()));

        let first = h.service.submit_invoice(&ctx, &payment_id).await.unwrap();
        h.service.submit_invoice(&ctx, &payment_id).await.unwrap();

        let entries = h.audit.find_by_resource("payments", &payment_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry.action, GENERATE_INVOICE_ACTION);
            assert_eq!(entry.actor.as_deref(), Some("ops@suncube.example"));
            assert_eq!(entry.meta["job_id"], serde_json::json!(first.job.id));
        }
        let flags: Vec<bool> = entries
            .iter()
            .map(|e| e.meta["deduplicated"].as_bool().unwrap())
            .collect();
        assert!(flags.contains(&true) && flags.contains(&false));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_submit() {
        let h = harness_with_audit(Some(Arc::new(BrokenAudit)));
        let s = h
            .service
            .submit_invoice(&RequestContext::system(), &PaymentId::new().to_string())
            .await
            .unwrap();
        assert_eq!(s.job.state, JobState::Queued);
    }

    #[tokio::test]
    async fn test_stats_and_listing() {
        let h = harness();
        let ctx = RequestContext::system();
        for _ in 0..3 {
            h.service
                .submit_invoice(&ctx, &PaymentId::new().to_string())
                .await
                .unwrap();
        }

        let stats = h.service.stats().await.unwrap();
        assert_eq!(stats.jobs.get(JobState::Queued), 3);
        assert_eq!(stats.jobs.total(), 3);
        assert_eq!(stats.queue.ready, 3);

        let recent = h.service.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at >= recent[1].created_at);
    }
}
