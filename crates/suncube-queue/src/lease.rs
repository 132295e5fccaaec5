//! Queue contract shared by all backends.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::result::AppResult;
use suncube_core::types::JobId;

/// A delivered job id, invisible to other consumers until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLease {
    /// Delivered job.
    pub job_id: JobId,
    /// Token identifying this delivery; required to acknowledge it.
    pub token: String,
    /// When the delivery becomes eligible for redelivery.
    pub expires_at: DateTime<Utc>,
}

/// Number of ready and leased descriptors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    /// Waiting for a consumer.
    pub ready: u64,
    /// Delivered and not yet acknowledged.
    pub in_flight: u64,
}

/// At-least-once job id queue.
///
/// Duplicates are possible (redelivery, re-enqueue), so consumers must
/// deduplicate through the job store's compare-and-swap claim.
#[async_trait]
pub trait JobQueue: Send + Sync + Debug + 'static {
    /// Return the provider type name (e.g., "memory", "redis").
    fn provider_type(&self) -> &str;

    /// Make `job_id` available to consumers. Enqueuing an id that is already
    /// waiting is a no-op.
    async fn enqueue(&self, job_id: JobId) -> AppResult<()>;

    /// Wait up to `wait` for a job id. The returned lease hides the id from
    /// other consumers until it expires or is acknowledged.
    async fn dequeue(&self, wait: Duration) -> AppResult<Option<QueueLease>>;

    /// Remove a delivery permanently. Returns `false` when the lease had
    /// already expired and been handed to another consumer.
    async fn ack(&self, lease: &QueueLease) -> AppResult<bool>;

    /// Current ready / in-flight counts.
    async fn depth(&self) -> AppResult<QueueDepth>;

    /// Check whether the backing store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
