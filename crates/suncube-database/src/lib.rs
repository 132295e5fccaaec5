//! # suncube-database
//!
//! Durable job state and the collaborator records the pipeline reads.
//! Every store is exposed as a trait with a PostgreSQL implementation
//! (row-level locking for compare-and-swap transitions) and an in-memory
//! implementation for single-node runs and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod provider;
pub mod repositories;

pub use connection::DatabasePool;
pub use provider::DatabaseBackend;
pub use repositories::{AuditSink, JobStore, PaymentLookup, StateCounts};
