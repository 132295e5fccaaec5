//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /invoices/generate`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInvoiceRequest {
    /// Payment to invoice; also the idempotency key.
    #[validate(length(min = 1, max = 64, message = "paymentId is required"))]
    pub payment_id: String,
}

/// Query of `GET /jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListJobsQuery {
    /// Page size.
    pub limit: Option<u32>,
}

/// Query of `GET /jobs/events`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Only stream events for this job.
    pub job_id: Option<String>,
}

/// Query of `GET /artifacts/{*key}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadQuery {
    /// Signed download token.
    pub token: Option<String>,
}
