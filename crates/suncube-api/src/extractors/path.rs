//! Typed path parameter helpers.

use suncube_core::error::AppError;
use suncube_core::types::JobId;

/// Parses a job id from a path segment. A malformed id names no job, so it
/// is reported as not found.
pub fn parse_job_id(s: &str) -> Result<JobId, AppError> {
    s.parse()
        .map_err(|_| AppError::not_found(format!("Job not found: {s}")))
}
