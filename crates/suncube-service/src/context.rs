//! Request context carrying who asked and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context for the current request.
///
/// The pipeline has no authentication of its own; the actor is whatever the
/// caller identified itself as and is only recorded in the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    /// Caller identity, when supplied.
    pub actor: Option<String>,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context.
    pub fn new(actor: Option<String>) -> Self {
        Self {
            actor: actor.filter(|a| !a.trim().is_empty()),
            request_time: Utc::now(),
        }
    }

    /// Context for calls made by the system itself.
    pub fn system() -> Self {
        Self::new(None)
    }
}
