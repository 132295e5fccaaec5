//! Built-in task implementations.

pub mod invoice;

pub use invoice::{GenerateInvoiceHandler, InvoiceRenderer};
