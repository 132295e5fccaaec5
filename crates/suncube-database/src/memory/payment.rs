//! In-memory payment directory.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use suncube_core::result::AppResult;
use suncube_core::types::PaymentId;
use suncube_entity::Payment;

use crate::repositories::PaymentLookup;

/// Payment lookup over a concurrent map, seeded by the caller.
#[derive(Debug, Clone, Default)]
pub struct MemoryPaymentDirectory {
    payments: Arc<DashMap<PaymentId, Payment>>,
}

impl MemoryPaymentDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a payment.
    pub fn insert(&self, payment: Payment) {
        self.payments.insert(payment.id, payment);
    }

    /// Number of known payments.
    pub fn len(&self) -> usize {
        self.payments.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

#[async_trait]
impl PaymentLookup for MemoryPaymentDirectory {
    async fn find_payment(&self, id: PaymentId) -> AppResult<Option<Payment>> {
        Ok(self.payments.get(&id).map(|entry| entry.value().clone()))
    }
}
