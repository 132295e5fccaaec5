//! Background job processing for SunCube.
//!
//! This crate provides:
//! - A worker pool that leases job ids from the queue, claims the job in the
//!   store, and executes it with a per-task timeout
//! - A task executor that dispatches jobs to the handler for their task type
//! - Retry backoff and the delayed release of failed jobs
//! - A reaper that reclaims jobs whose worker lease expired
//! - The invoice generation task and its PDF document renderer
//! - A broadcast bus for job lifecycle events

pub mod events;
pub mod executor;
pub mod jobs;
pub mod reaper;
pub mod render;
pub mod retry;
pub mod runner;

pub use events::{BroadcastEventBus, EventPublisher};
pub use executor::{TaskExecutor, TaskHandler};
pub use reaper::Reaper;
pub use retry::RetryPolicy;
pub use runner::WorkerPool;
