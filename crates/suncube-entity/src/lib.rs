//! # suncube-entity
//!
//! Domain entity models for SunCube invoicing. Every struct in this crate
//! represents a stored record or a domain value object. All entities
//! derive `Debug`, `Clone`, `Serialize`, `Deserialize`; plain table rows
//! additionally derive `sqlx::FromRow`.

pub mod artifact;
pub mod audit;
pub mod job;
pub mod payment;

pub use artifact::Artifact;
pub use audit::{AuditEntry, NewAuditEntry};
pub use job::{Claim, Job, JobError, JobErrorKind, JobEvent, JobEventKind, JobState, JobTransition, NewJob, TaskType};
pub use payment::Payment;
