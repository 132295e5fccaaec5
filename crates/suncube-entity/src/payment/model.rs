//! Payment entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use suncube_core::types::{CustomerId, PaymentId};

/// A customer payment as recorded by the billing system.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    /// Unique payment identifier.
    pub id: PaymentId,
    /// Customer that made the payment.
    pub customer_id: CustomerId,
    /// Amount in minor currency units (cents).
    pub amount_cents: i64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Billing status (e.g. `"paid"`, `"pending"`).
    pub status: String,
    /// Free-form line item description.
    pub description: Option<String>,
    /// When the payment was recorded.
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Format the amount as a decimal string, e.g. `"1234.50"`.
    pub fn formatted_amount(&self) -> String {
        let sign = if self.amount_cents < 0 { "-" } else { "" };
        let abs = self.amount_cents.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(amount_cents: i64) -> Payment {
        Payment {
            id: PaymentId::new(),
            customer_id: CustomerId::new(),
            amount_cents,
            currency: "USD".to_string(),
            status: "paid".to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_formatted_amount() {
        assert_eq!(payment(123450).formatted_amount(), "1234.50");
        assert_eq!(payment(7).formatted_amount(), "0.07");
        assert_eq!(payment(-250).formatted_amount(), "-2.50");
    }
}
