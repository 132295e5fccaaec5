//! # suncube-service
//!
//! Application services behind the Status API. Services follow constructor
//! injection: every collaborator is handed in as an `Arc` trait object at
//! construction time, so the same service runs against PostgreSQL/Redis/S3
//! in production and the in-memory backends in tests.

pub mod context;
pub mod job;

pub use context::RequestContext;
pub use job::{ArtifactLink, JobService, JobStatus, PipelineStats, Submission};
