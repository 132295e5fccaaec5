//! Document rendering for invoice artifacts.

pub mod pdf;

use std::fmt::Debug;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use suncube_core::result::AppResult;
use suncube_core::types::{CustomerId, PaymentId};
use suncube_entity::Payment;

pub use pdf::PdfInvoiceRenderer;

/// Everything printed on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    /// Human-facing invoice number.
    pub number: String,
    /// Billed customer.
    pub customer_id: CustomerId,
    /// Payment the invoice covers.
    pub payment_id: PaymentId,
    /// Formatted amount, e.g. `"1234.50"`.
    pub amount: String,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Payment status at render time.
    pub status: String,
    /// Line item description.
    pub description: String,
    /// Issue date (the payment date, so re-renders are byte-identical).
    pub issued_at: DateTime<Utc>,
}

impl InvoiceDocument {
    /// Build the invoice for a payment.
    pub fn from_payment(payment: &Payment) -> Self {
        let short = payment.id.to_string().replace('-', "");
        Self {
            number: format!("INV-{}", short[..12].to_uppercase()),
            customer_id: payment.customer_id,
            payment_id: payment.id,
            amount: payment.formatted_amount(),
            currency: payment.currency.to_uppercase(),
            status: payment.status.clone(),
            description: payment
                .description
                .clone()
                .unwrap_or_else(|| "Payment".to_string()),
            issued_at: payment.created_at,
        }
    }
}

/// Turns an invoice into document bytes.
pub trait DocumentRenderer: Send + Sync + Debug + 'static {
    /// MIME type of the produced document.
    fn content_type(&self) -> &'static str;

    /// File extension used in storage keys, without the dot.
    fn file_extension(&self) -> &'static str;

    /// Render the invoice. Output must depend only on `invoice`.
    fn render(&self, invoice: &InvoiceDocument) -> AppResult<Bytes>;
}
