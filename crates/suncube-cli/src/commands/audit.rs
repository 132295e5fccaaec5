//! Audit trail inspection.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use suncube_core::error::AppError;
use suncube_core::types::PaymentId;
use suncube_database::DatabaseBackend;
use suncube_entity::AuditEntry;
use suncube_service::job::service::INVOICE_RESOURCE_TYPE;

use crate::output::{self, OutputFormat};

/// Arguments for audit commands
#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Audit subcommand
    #[command(subcommand)]
    pub command: AuditCommand,
}

/// Audit subcommands
#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Show invoice requests recorded for a payment
    Show {
        /// Payment ID
        payment_id: String,
    },
}

/// Audit display row
#[derive(Debug, Serialize, Tabled)]
struct AuditRow {
    /// When
    time: String,
    /// Actor
    actor: String,
    /// Action
    action: String,
    /// Details
    meta: String,
}

impl From<AuditEntry> for AuditRow {
    fn from(e: AuditEntry) -> Self {
        Self {
            time: e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            actor: e.actor.unwrap_or_else(|| "-".to_string()),
            action: e.action,
            meta: e.meta.to_string(),
        }
    }
}

/// Execute audit commands
pub async fn execute(args: &AuditArgs, env: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(env)?;
    if config.database.provider == "memory" {
        output::print_warning("In-memory database: only entries from this process are visible");
    }
    let database = DatabaseBackend::connect(&config.database).await?;

    match &args.command {
        AuditCommand::Show { payment_id } => {
            let payment_id: PaymentId = payment_id
                .trim()
                .parse()
                .map_err(|_| AppError::validation("paymentId must be a UUID"))?;
            let entries = database
                .audit
                .find_by_resource(INVOICE_RESOURCE_TYPE, &payment_id.to_string())
                .await?;
            let rows: Vec<AuditRow> = entries.into_iter().map(AuditRow::from).collect();
            output::print_list(&rows, format);
        }
    }

    if let Some(pool) = &database.pool {
        pool.close().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_row_from_entry_without_actor() {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            actor: None,
            action: "GENERATE_INVOICE".to_string(),
            resource_type: INVOICE_RESOURCE_TYPE.to_string(),
            resource_id: PaymentId::new().to_string(),
            meta: serde_json::json!({ "deduplicated": false }),
            created_at: Utc::now(),
        };
        let row = AuditRow::from(entry);
        assert_eq!(row.actor, "-");
        assert_eq!(row.action, "GENERATE_INVOICE");
        assert_eq!(row.meta, r#"{"deduplicated":false}"#);
    }
}
