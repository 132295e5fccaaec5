//! Connection to the Redis instance holding the queue.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use suncube_core::config::queue::RedisQueueConfig;
use suncube_core::error::{AppError, ErrorKind};
use suncube_core::result::AppResult;

/// Keys backing one named queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    /// Sorted set of waiting job ids.
    pub ready: String,
    /// Sorted set of leased job ids, scored by lease deadline.
    pub inflight: String,
    /// Hash of job id to the current delivery token.
    pub tokens: String,
}

impl QueueKeys {
    /// Keys for queue `name` under `prefix`.
    pub fn new(prefix: &str, name: &str) -> Self {
        Self {
            ready: format!("{prefix}{name}:ready"),
            inflight: format!("{prefix}{name}:inflight"),
            tokens: format!("{prefix}{name}:tokens"),
        }
    }
}

/// Reconnecting, multiplexed Redis connection plus the key prefix.
#[derive(Debug, Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisClient {
    /// Connect to the Redis named in `config`.
    pub async fn connect(config: &RedisQueueConfig) -> AppResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid Redis URL", e)
        })?;
        info!(
            endpoint = endpoint(&config.url),
            key_prefix = %config.key_prefix,
            "Connecting to Redis job queue"
        );

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::with_source(ErrorKind::Queue, "Failed to connect to Redis", e)
        })?;

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Keys for queue `name`.
    pub fn queue_keys(&self, name: &str) -> QueueKeys {
        QueueKeys::new(&self.key_prefix, name)
    }

    /// Handle for issuing commands; clones share the connection.
    pub fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// `PING` the server.
    pub async fn ping(&self) -> AppResult<bool> {
        let mut conn = self.conn();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Queue, "Redis health check failed", e))?;
        Ok(pong == "PONG")
    }
}

/// Host part of a Redis URL, without scheme or credentials.
fn endpoint(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.rsplit_once('@').map_or(rest, |(_, host)| host)
}
