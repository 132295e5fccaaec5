//! Payment lookup against the billing `payments` table.

use async_trait::async_trait;
use sqlx::PgPool;

use suncube_core::error::{AppError, ErrorKind};
use suncube_core::result::AppResult;
use suncube_core::types::PaymentId;
use suncube_entity::Payment;

use super::PaymentLookup;

/// Read-only repository for payments.
#[derive(Debug, Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    /// Create a new payment repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentLookup for PgPaymentRepository {
    async fn find_payment(&self, id: PaymentId) -> AppResult<Option<Payment>> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find payment", e))
    }
}
