//! Task types and their typed payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use suncube_core::types::PaymentId;

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Render an invoice PDF for a payment and upload it.
    GenerateInvoice,
}

impl TaskType {
    /// Return the task type as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateInvoice => "generate_invoice",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate_invoice" => Ok(Self::GenerateInvoice),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

/// Payload of a [`TaskType::GenerateInvoice`] job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateInvoicePayload {
    /// Payment to render an invoice for.
    pub payment_id: PaymentId,
}
