//! Queue selection based on configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use suncube_core::config::QueueConfig;
use suncube_core::error::AppError;
use suncube_core::result::AppResult;

use crate::lease::JobQueue;

/// Builds the configured queue backend.
#[derive(Debug)]
pub struct QueueManager;

impl QueueManager {
    /// Connect the queue selected by `config.provider`.
    pub async fn connect(config: &QueueConfig) -> AppResult<Arc<dyn JobQueue>> {
        let visibility = Duration::from_secs(config.visibility_timeout_seconds);
        let queue: Arc<dyn JobQueue> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!(queue = %config.name, "Initializing Redis job queue");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Arc::new(crate::redis::RedisJobQueue::new(
                    client,
                    &config.name,
                    visibility,
                ))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!(queue = %config.name, "Initializing in-memory job queue");
                Arc::new(crate::memory::MemoryJobQueue::new(visibility))
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown queue provider: '{other}'. Supported: memory, redis"
                )));
            }
        };
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suncube_core::error::ErrorKind;

    #[tokio::test]
    async fn test_memory_provider() {
        let queue = QueueManager::connect(&QueueConfig::default()).await.unwrap();
        assert_eq!(queue.provider_type(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let config = QueueConfig {
            provider: "sqs".to_string(),
            ..QueueConfig::default()
        };
        let err = QueueManager::connect(&config).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
