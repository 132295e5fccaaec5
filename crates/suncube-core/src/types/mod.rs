//! Shared value types.

pub mod id;

pub use id::{CustomerId, JobId, PaymentId};
