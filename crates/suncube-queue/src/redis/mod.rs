//! Redis-backed queue for multi-node deployments.
//!
//! Layout (all keys share the configured prefix and queue name):
//!
//! - `{prefix}{name}:ready`    sorted set of waiting job ids, scored by enqueue time
//! - `{prefix}{name}:inflight` sorted set of leased job ids, scored by lease deadline
//! - `{prefix}{name}:tokens`   hash of job id to the current delivery token
//!
//! Dequeue and ack run as Lua scripts so that redelivery, leasing and
//! acknowledgement are atomic across consumers.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use suncube_core::error::{AppError, ErrorKind};
use suncube_core::result::AppResult;
use suncube_core::types::JobId;

pub use client::{QueueKeys, RedisClient};

use crate::lease::{JobQueue, QueueDepth, QueueLease};

/// Interval between polls while waiting for work.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Ready ids examined per `ZRANGE` in the dequeue script.
const SCAN_PAGE: u32 = 100;

/// Atomic dequeue.
///
/// KEYS[1] = ready set
/// KEYS[2] = in-flight set
/// KEYS[3] = token hash
/// ARGV[1] = now (ms)
/// ARGV[2] = lease deadline (ms)
/// ARGV[3] = delivery token
/// ARGV[4] = scan page size
///
/// Ids that are both waiting and leased (re-enqueued while in flight) stay in
/// the ready set until acked, so the scan pages past them instead of stopping
/// at the first page.
///
/// Returns the leased job id, or nil when nothing is deliverable.
const DEQUEUE_SCRIPT: &str = r#"
    local ready = KEYS[1]
    local inflight = KEYS[2]
    local tokens = KEYS[3]
    local now = tonumber(ARGV[1])

    local expired = redis.call('ZRANGEBYSCORE', inflight, '-inf', now, 'WITHSCORES')
    for i = 1, #expired, 2 do
        local id = expired[i]
        redis.call('ZREM', inflight, id)
        redis.call('HDEL', tokens, id)
        redis.call('ZADD', ready, 'NX', expired[i + 1], id)
    end

    local page = tonumber(ARGV[4])
    local offset = 0
    while true do
        local candidates = redis.call('ZRANGE', ready, offset, offset + page - 1)
        if #candidates == 0 then
            return false
        end
        for _, id in ipairs(candidates) do
            if not redis.call('ZSCORE', inflight, id) then
                redis.call('ZREM', ready, id)
                redis.call('ZADD', inflight, tonumber(ARGV[2]), id)
                redis.call('HSET', tokens, id, ARGV[3])
                return id
            end
        end
        offset = offset + #candidates
    end
"#;

/// Atomic acknowledgement.
///
/// KEYS[1] = in-flight set
/// KEYS[2] = token hash
/// ARGV[1] = job id
/// ARGV[2] = delivery token
///
/// Returns 1 when the lease was still owned, 0 otherwise.
const ACK_SCRIPT: &str = r#"
    if redis.call('HGET', KEYS[2], ARGV[1]) == ARGV[2] then
        redis.call('ZREM', KEYS[1], ARGV[1])
        redis.call('HDEL', KEYS[2], ARGV[1])
        return 1
    end
    return 0
"#;

fn queue_err(message: &'static str) -> impl FnOnce(redis::RedisError) -> AppError {
    move |e| AppError::with_source(ErrorKind::Queue, message, e)
}

/// Queue stored in Redis sorted sets.
#[derive(Debug, Clone)]
pub struct RedisJobQueue {
    client: RedisClient,
    keys: QueueKeys,
    visibility_timeout: Duration,
}

impl RedisJobQueue {
    /// Create a queue named `name` on an existing client.
    pub fn new(client: RedisClient, name: &str, visibility_timeout: Duration) -> Self {
        Self {
            keys: client.queue_keys(name),
            client,
            visibility_timeout,
        }
    }

    async fn try_take(&self) -> AppResult<Option<QueueLease>> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.visibility_timeout).unwrap_or_default();
        let expires_at: DateTime<Utc> = now + ttl;
        let token = Uuid::new_v4().to_string();

        let mut conn = self.client.conn();
        let id: Option<String> = redis::Script::new(DEQUEUE_SCRIPT)
            .key(&self.keys.ready)
            .key(&self.keys.inflight)
            .key(&self.keys.tokens)
            .arg(now.timestamp_millis())
            .arg(expires_at.timestamp_millis())
            .arg(&token)
            .arg(SCAN_PAGE)
            .invoke_async(&mut conn)
            .await
            .map_err(queue_err("Failed to dequeue job"))?;

        let Some(id) = id else {
            return Ok(None);
        };
        let job_id: JobId = id
            .parse()
            .map_err(|e| AppError::with_source(ErrorKind::Queue, "Malformed job id in queue", e))?;

        Ok(Some(QueueLease {
            job_id,
            token,
            expires_at,
        }))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    fn provider_type(&self) -> &str {
        "redis"
    }

    async fn enqueue(&self, job_id: JobId) -> AppResult<()> {
        let mut conn = self.client.conn();
        let _: i64 = redis::cmd("ZADD")
            .arg(&self.keys.ready)
            .arg("NX")
            .arg(Utc::now().timestamp_millis())
            .arg(job_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(queue_err("Failed to enqueue job"))?;
        debug!(job_id = %job_id, "Enqueued job");
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> AppResult<Option<QueueLease>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(lease) = self.try_take().await? {
                return Ok(Some(lease));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn ack(&self, lease: &QueueLease) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let owned: i64 = redis::Script::new(ACK_SCRIPT)
            .key(&self.keys.inflight)
            .key(&self.keys.tokens)
            .arg(lease.job_id.to_string())
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await
            .map_err(queue_err("Failed to acknowledge job"))?;
        Ok(owned == 1)
    }

    async fn depth(&self) -> AppResult<QueueDepth> {
        let mut conn = self.client.conn();
        let ready: u64 = conn
            .zcard(&self.keys.ready)
            .await
            .map_err(queue_err("Failed to read queue depth"))?;
        let in_flight: u64 = conn
            .zcard(&self.keys.inflight)
            .await
            .map_err(queue_err("Failed to read queue depth"))?;
        Ok(QueueDepth { ready, in_flight })
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.client.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suncube_core::config::queue::RedisQueueConfig;

    async fn live_queue(name: &str) -> RedisJobQueue {
        let config = RedisQueueConfig {
            url: std::env::var("SUNCUBE_TEST_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: format!("suncube-test-{}:", Uuid::new_v4().simple()),
        };
        let client = RedisClient::connect(&config).await.unwrap();
        RedisJobQueue::new(client, name, Duration::from_secs(30))
    }

    #[tokio::test]
    #[ignore = "requires a Redis server (SUNCUBE_TEST_REDIS_URL)"]
    async fn test_waiting_job_behind_a_page_of_leased_ids_is_delivered() {
        let queue = live_queue("invoices").await;
        let page = SCAN_PAGE as usize + 5;

        let mut leases = Vec::with_capacity(page);
        for _ in 0..page {
            queue.enqueue(JobId::new()).await.unwrap();
            leases.push(queue.dequeue(Duration::ZERO).await.unwrap().unwrap());
        }
        // Re-enqueued while in flight: parked in ready until acked.
        for lease in &leases {
            queue.enqueue(lease.job_id).await.unwrap();
        }
        let fresh = JobId::new();
        queue.enqueue(fresh).await.unwrap();

        let lease = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(lease.job_id, fresh);
        assert!(queue.dequeue(Duration::ZERO).await.unwrap().is_none());
    }
}
