//! # suncube-queue
//!
//! At-least-once delivery of job identifiers to workers. The queue carries
//! only job ids; the job store remains the source of truth for job state.
//! A dequeued id is leased for the visibility timeout and redelivered if the
//! lease is not acknowledged in time.

pub mod lease;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use lease::{JobQueue, QueueDepth, QueueLease};
pub use provider::QueueManager;
