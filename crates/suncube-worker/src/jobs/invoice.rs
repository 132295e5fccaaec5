//! Invoice generation task.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use suncube_core::error::ErrorKind;
use suncube_core::traits::storage::ObjectStore;
use suncube_core::types::PaymentId;
use suncube_database::PaymentLookup;
use suncube_entity::job::GenerateInvoicePayload;
use suncube_entity::{Artifact, Job, JobError, JobErrorKind, Payment, TaskType};

use crate::executor::TaskHandler;
use crate::render::{DocumentRenderer, InvoiceDocument};

/// Renders a payment's invoice and writes it to durable storage.
///
/// The storage key depends only on the payment, so repeated renders of the
/// same payment overwrite one object instead of accumulating copies.
#[derive(Debug, Clone)]
pub struct InvoiceRenderer {
    payments: Arc<dyn PaymentLookup>,
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn DocumentRenderer>,
}

impl InvoiceRenderer {
    /// Create a renderer over its collaborators.
    pub fn new(
        payments: Arc<dyn PaymentLookup>,
        store: Arc<dyn ObjectStore>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self {
            payments,
            store,
            renderer,
        }
    }

    /// Storage key for a payment's invoice.
    pub fn storage_key(&self, payment: &Payment) -> String {
        format!(
            "invoices/{}/{}.{}",
            payment.customer_id,
            payment.id,
            self.renderer.file_extension()
        )
    }

    /// Produce and store the invoice for `payment_id`.
    pub async fn render(&self, payment_id: PaymentId) -> Result<Artifact, JobError> {
        let payment = self
            .payments
            .find_payment(payment_id)
            .await
            .map_err(|e| JobError::new(JobErrorKind::Internal, format!("Payment lookup failed: {e}")))?
            .ok_or_else(|| {
                JobError::new(
                    JobErrorKind::PaymentNotFound,
                    format!("Payment {payment_id} does not exist"),
                )
            })?;

        let document = InvoiceDocument::from_payment(&payment);
        let bytes = self
            .renderer
            .render(&document)
            .map_err(|e| JobError::new(JobErrorKind::Render, e.message))?;
        let size_bytes = bytes.len() as u64;

        let storage_key = self.storage_key(&payment);
        self.store
            .put(&storage_key, bytes, self.renderer.content_type())
            .await
            .map_err(|e| {
                let kind = match e.kind {
                    ErrorKind::Validation => JobErrorKind::Validation,
                    _ => JobErrorKind::Storage,
                };
                JobError::new(kind, e.message)
            })?;

        info!(payment_id = %payment_id, storage_key = %storage_key, size_bytes, "Stored invoice");
        Ok(Artifact {
            storage_key,
            payment_id,
            content_type: self.renderer.content_type().to_string(),
            size_bytes,
        })
    }
}

/// Handler for [`TaskType::GenerateInvoice`] jobs.
#[derive(Debug, Clone)]
pub struct GenerateInvoiceHandler {
    renderer: InvoiceRenderer,
}

impl GenerateInvoiceHandler {
    /// Create a handler that delegates to `renderer`.
    pub fn new(renderer: InvoiceRenderer) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl TaskHandler for GenerateInvoiceHandler {
    fn task_type(&self) -> TaskType {
        TaskType::GenerateInvoice
    }

    async fn execute(&self, job: &Job) -> Result<Artifact, JobError> {
        let payload: GenerateInvoicePayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| {
                warn!(job_id = %job.id, error = %e, "Malformed invoice payload");
                JobError::new(JobErrorKind::Validation, format!("Malformed payload: {e}"))
            })?;
        self.renderer.render(payload.payment_id).await
    }
}
