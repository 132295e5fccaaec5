//! Audit log entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An immutable audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Who performed the action, when known.
    pub actor: Option<String>,
    /// Action name, e.g. `"GENERATE_INVOICE"`.
    pub action: String,
    /// Type of resource acted upon.
    pub resource_type: String,
    /// Identifier of the resource acted upon.
    pub resource_id: String,
    /// Additional structured details.
    pub meta: serde_json::Value,
    /// When the action occurred.
    pub created_at: DateTime<Utc>,
}

/// Data required to append an audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
    /// Who performed the action.
    pub actor: Option<String>,
    /// Action name.
    pub action: String,
    /// Type of resource acted upon.
    pub resource_type: String,
    /// Identifier of the resource acted upon.
    pub resource_id: String,
    /// Additional structured details.
    pub meta: serde_json::Value,
}
