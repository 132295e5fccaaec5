//! Store traits and their PostgreSQL implementations.

pub mod audit;
pub mod job;
pub mod payment;

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::result::AppResult;
use suncube_core::types::{JobId, PaymentId};
use suncube_entity::audit::{AuditEntry, NewAuditEntry};
use suncube_entity::{Job, JobState, JobTransition, NewJob, Payment};

pub use audit::PgAuditLog;
pub use job::PgJobStore;
pub use payment::PgPaymentRepository;

/// Number of jobs in each state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts(pub BTreeMap<JobState, u64>);

impl StateCounts {
    /// Count for one state (zero when absent).
    pub fn get(&self, state: JobState) -> u64 {
        self.0.get(&state).copied().unwrap_or(0)
    }

    /// Total number of jobs.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// Durable job records with compare-and-swap state transitions.
#[async_trait]
pub trait JobStore: Send + Sync + Debug + 'static {
    /// Insert a new queued job.
    ///
    /// Fails with `Conflict` when a live job already holds the idempotency key.
    async fn create(&self, data: NewJob) -> AppResult<Job>;

    /// Fetch a job by id, or `NotFound`.
    async fn get(&self, id: JobId) -> AppResult<Job>;

    /// Fetch the most recent job for an idempotency key, or `NotFound`.
    ///
    /// The live job for a key, when one exists, is always the most recent.
    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Job>;

    /// Move a job from `from` to `to`, applying `changes`, only if the job is
    /// currently in `from`. Otherwise fails with `InvalidTransition` and leaves
    /// the job untouched.
    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        changes: JobTransition,
    ) -> AppResult<Job>;

    /// Running jobs whose lease expired at or before `now`.
    async fn find_expired_leases(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>>;

    /// Failed jobs whose retry time has arrived.
    async fn find_due_retries(&self, now: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>>;

    /// Queued jobs not updated since `before`, oldest first.
    async fn find_stalled_queued(&self, before: DateTime<Utc>, limit: u32) -> AppResult<Vec<Job>>;

    /// Number of jobs per state.
    async fn count_by_state(&self) -> AppResult<StateCounts>;

    /// Most recently created jobs, newest first.
    async fn list_recent(&self, limit: u32) -> AppResult<Vec<Job>>;
}

/// Read access to the billing system's payments.
#[async_trait]
pub trait PaymentLookup: Send + Sync + Debug + 'static {
    /// Find a payment by id.
    async fn find_payment(&self, id: PaymentId) -> AppResult<Option<Payment>>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync + Debug + 'static {
    /// Append an entry.
    async fn record(&self, entry: NewAuditEntry) -> AppResult<AuditEntry>;

    /// Entries for one resource, newest first.
    async fn find_by_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<Vec<AuditEntry>>;
}
