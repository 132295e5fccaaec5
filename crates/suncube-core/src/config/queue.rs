//! Queue backing store configuration.

use serde::{Deserialize, Serialize};

/// Job queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue provider type: `"memory"` or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Name of the logical queue.
    #[serde(default = "default_name")]
    pub name: String,
    /// Seconds a dequeued descriptor stays invisible before redelivery.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u64,
    /// Redis-specific settings.
    #[serde(default)]
    pub redis: RedisQueueConfig,
}

/// Redis queue backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisQueueConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for all queue keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_name(),
            visibility_timeout_seconds: default_visibility_timeout(),
            redis: RedisQueueConfig::default(),
        }
    }
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_name() -> String {
    "invoices".to_string()
}

fn default_visibility_timeout() -> u64 {
    120
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "suncube:".to_string()
}
