//! In-process queue for single-node deployments and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use suncube_core::result::AppResult;
use suncube_core::types::JobId;

use crate::lease::{JobQueue, QueueDepth, QueueLease};

#[derive(Debug)]
struct InFlight {
    token: String,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<JobId>,
    in_flight: HashMap<JobId, InFlight>,
}

impl State {
    /// Move expired deliveries back to the front of the ready list.
    fn redeliver_expired(&mut self, now: Instant) {
        let expired: Vec<JobId> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for job_id in expired {
            self.in_flight.remove(&job_id);
            if !self.ready.contains(&job_id) {
                self.ready.push_front(job_id);
            }
            debug!(job_id = %job_id, "Lease expired, redelivering");
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.deadline).min()
    }
}

/// Queue held in process memory.
#[derive(Debug, Clone)]
pub struct MemoryJobQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    visibility_timeout: Duration,
}

impl MemoryJobQueue {
    /// Create an empty queue whose deliveries stay invisible for `visibility_timeout`.
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            notify: Arc::new(Notify::new()),
            visibility_timeout,
        }
    }

    async fn try_take(&self) -> Option<QueueLease> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Instant::now();
        state.redeliver_expired(now);

        let pos = state
            .ready
            .iter()
            .position(|id| !state.in_flight.contains_key(id))?;
        let job_id = state.ready.remove(pos)?;
        let token = Uuid::new_v4().to_string();
        state.in_flight.insert(
            job_id,
            InFlight {
                token: token.clone(),
                deadline: now + self.visibility_timeout,
            },
        );

        let ttl = chrono::Duration::from_std(self.visibility_timeout).unwrap_or_default();
        Some(QueueLease {
            job_id,
            token,
            expires_at: Utc::now() + ttl,
        })
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn enqueue(&self, job_id: JobId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.ready.contains(&job_id) {
            state.ready.push_back(job_id);
        }
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> AppResult<Option<QueueLease>> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(lease) = self.try_take().await {
                return Ok(Some(lease));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            let wake_at = match self.state.lock().await.next_expiry() {
                Some(expiry) => expiry.min(deadline),
                None => deadline,
            };
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&self, lease: &QueueLease) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let owned = state
            .in_flight
            .get(&lease.job_id)
            .is_some_and(|f| f.token == lease.token);
        if owned {
            state.in_flight.remove(&lease.job_id);
            let waiting = state.ready.contains(&lease.job_id);
            drop(state);
            if waiting {
                self.notify.notify_one();
            }
        }
        Ok(owned)
    }

    async fn depth(&self) -> AppResult<QueueDepth> {
        let state = self.state.lock().await;
        Ok(QueueDepth {
            ready: state.ready.len() as u64,
            in_flight: state.in_flight.len() as u64,
        })
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_leased_job_is_not_delivered_twice() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();

        let lease = queue.dequeue(SHORT).await.unwrap().unwrap();
        assert_eq!(lease.job_id, job_id);
        assert!(queue.dequeue(SHORT).await.unwrap().is_none());

        assert!(queue.ack(&lease).await.unwrap());
        assert_eq!(queue.depth().await.unwrap(), QueueDepth::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacked_lease_is_redelivered() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();

        let first = queue.dequeue(SHORT).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        let second = queue.dequeue(SHORT).await.unwrap().unwrap();
        assert_eq!(second.job_id, job_id);
        assert_ne!(second.token, first.token);

        assert!(!queue.ack(&first).await.unwrap());
        assert!(queue.ack(&second).await.unwrap());
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();

        let lease = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(lease.job_id, job_id);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_collapsed() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();
        queue.enqueue(job_id).await.unwrap();
        assert_eq!(queue.depth().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_reenqueued_job_waits_for_ack() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();
        let lease = queue.dequeue(SHORT).await.unwrap().unwrap();

        queue.enqueue(job_id).await.unwrap();
        assert!(queue.dequeue(SHORT).await.unwrap().is_none());

        queue.ack(&lease).await.unwrap();
        let again = queue.dequeue(SHORT).await.unwrap().unwrap();
        assert_eq!(again.job_id, job_id);
    }

    #[tokio::test]
    async fn test_concurrent_consumers_split_work() {
        let queue = MemoryJobQueue::new(Duration::from_secs(30));
        let ids: Vec<JobId> = (0..10).map(|_| JobId::new()).collect();
        for id in &ids {
            queue.enqueue(*id).await.unwrap();
        }

        let consumers = (0..4).map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(lease) = queue.dequeue(SHORT).await.unwrap() {
                    got.push(lease.job_id);
                }
                got
            })
        });
        let mut delivered: Vec<JobId> = futures::future::join_all(consumers)
            .await
            .into_iter()
            .flat_map(|r| r.unwrap())
            .collect();
        delivered.sort();
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(delivered, expected);
    }
}
