//! Job submission and status services.

pub mod service;
pub mod types;

pub use service::JobService;
pub use types::{ArtifactLink, JobStatus, PipelineStats, Submission};
