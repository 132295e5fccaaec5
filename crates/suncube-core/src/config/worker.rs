//! Background worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker pool runs inside this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent job processing loops.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How long a dequeue call waits for work, in milliseconds.
    #[serde(default = "default_poll_wait")]
    pub poll_wait_ms: u64,
    /// Maximum execution attempts per job.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Upper bound for the retry delay in milliseconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
    /// How long a `running` job may go without finishing before the reaper reclaims it.
    #[serde(default = "default_lease")]
    pub lease_seconds: u64,
    /// Timeout applied to a single task invocation.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_seconds: u64,
    /// Interval between reaper sweeps.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
    /// Queued jobs untouched for this long are pushed onto the queue again.
    #[serde(default = "default_requeue_stalled_after")]
    pub requeue_stalled_after_seconds: u64,
    /// Issuer name printed on rendered invoices.
    #[serde(default = "default_issuer")]
    pub invoice_issuer: String,
}

impl WorkerConfig {
    /// Poll wait as a [`Duration`].
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    /// Lease as a [`Duration`].
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    /// Task timeout as a [`Duration`].
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    /// Reaper interval as a [`Duration`].
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }

    /// Stalled-queue threshold as a [`Duration`].
    pub fn requeue_stalled_after(&self) -> Duration {
        Duration::from_secs(self.requeue_stalled_after_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_concurrency(),
            poll_wait_ms: default_poll_wait(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            lease_seconds: default_lease(),
            task_timeout_seconds: default_task_timeout(),
            reaper_interval_seconds: default_reaper_interval(),
            requeue_stalled_after_seconds: default_requeue_stalled_after(),
            invoice_issuer: default_issuer(),
        }
    }
}

fn default_issuer() -> String {
    "SunCube Solar".to_string()
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_wait() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

fn default_backoff_cap() -> u64 {
    30_000
}

fn default_lease() -> u64 {
    90
}

fn default_task_timeout() -> u64 {
    60
}

fn default_reaper_interval() -> u64 {
    15
}

fn default_requeue_stalled_after() -> u64 {
    300
}
