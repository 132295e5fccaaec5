//! Durable object storage trait for rendered artifacts.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;

/// A time-limited download link for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
    /// Fully qualified URL.
    pub url: String,
    /// Instant after which the URL stops working.
    pub expires_at: DateTime<Utc>,
}

/// Trait for artifact storage backends.
///
/// Writes are keyed by an opaque storage key and must overwrite any
/// previous object under the same key, so that a task retried after a
/// partial failure converges on a single object.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "s3").
    fn provider_type(&self) -> &str;

    /// Check whether the provider is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Store bytes under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()>;

    /// Read the object stored under `key`.
    async fn get(&self, key: &str) -> AppResult<Bytes>;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Produce a download URL for `key` valid for `ttl`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> AppResult<SignedUrl>;
}
