//! Structured failure recorded on a job.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobErrorKind {
    /// The payload was malformed.
    #[serde(rename = "ValidationError")]
    Validation,
    /// The referenced payment does not exist.
    PaymentNotFound,
    /// Document generation failed.
    #[serde(rename = "RenderError")]
    Render,
    /// Uploading the artifact failed.
    #[serde(rename = "StorageError")]
    Storage,
    /// The task did not finish within its timeout.
    Timeout,
    /// The worker holding the job stopped renewing it.
    LeaseExpired,
    /// No handler is registered for the task type.
    UnknownTask,
    /// Unexpected infrastructure failure.
    Internal,
}

impl JobErrorKind {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Render | Self::Storage | Self::Timeout | Self::LeaseExpired | Self::Internal
        )
    }

    /// Name as exposed in status responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::PaymentNotFound => "PaymentNotFound",
            Self::Render => "RenderError",
            Self::Storage => "StorageError",
            Self::Timeout => "Timeout",
            Self::LeaseExpired => "LeaseExpired",
            Self::UnknownTask => "UnknownTask",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The last error observed for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Failure classification.
    pub kind: JobErrorKind,
    /// Human-readable detail for operators.
    pub message: String,
}

impl JobError {
    /// Create a new job error.
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
