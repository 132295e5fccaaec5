//! Store selection based on the configured database provider.

use std::sync::Arc;

use tracing::info;

use suncube_core::config::DatabaseConfig;
use suncube_core::error::AppError;
use suncube_core::result::AppResult;

use crate::connection::DatabasePool;
use crate::memory::{MemoryAuditLog, MemoryJobStore, MemoryPaymentDirectory};
use crate::repositories::{
    AuditSink, JobStore, PaymentLookup, PgAuditLog, PgJobStore, PgPaymentRepository,
};

/// The set of stores the pipeline runs against.
#[derive(Debug, Clone)]
pub struct DatabaseBackend {
    /// Job records.
    pub jobs: Arc<dyn JobStore>,
    /// Payment lookup.
    pub payments: Arc<dyn PaymentLookup>,
    /// Audit trail.
    pub audit: Arc<dyn AuditSink>,
    /// Connection pool when running against PostgreSQL.
    pub pool: Option<DatabasePool>,
}

impl DatabaseBackend {
    /// Connect the stores selected by `config.provider`.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            "postgres" => {
                info!("Initializing PostgreSQL job store");
                let db = DatabasePool::connect(config).await?;
                if config.run_migrations {
                    crate::migration::run_migrations(db.pool()).await?;
                }
                Ok(Self {
                    jobs: Arc::new(PgJobStore::new(db.pool().clone())),
                    payments: Arc::new(PgPaymentRepository::new(db.pool().clone())),
                    audit: Arc::new(PgAuditLog::new(db.pool().clone())),
                    pool: Some(db),
                })
            }
            "memory" => {
                info!("Initializing in-memory job store (non-durable)");
                Ok(Self::in_memory(MemoryPaymentDirectory::new()))
            }
            other => Err(AppError::configuration(format!(
                "Unknown database provider: '{other}'. Supported: memory, postgres"
            ))),
        }
    }

    /// In-memory stores over the given payment directory.
    pub fn in_memory(payments: MemoryPaymentDirectory) -> Self {
        Self {
            jobs: Arc::new(MemoryJobStore::new()),
            payments: Arc::new(payments),
            audit: Arc::new(MemoryAuditLog::new()),
            pool: None,
        }
    }

    /// Check connectivity of the durable backend, if any.
    pub async fn health_check(&self) -> AppResult<bool> {
        match &self.pool {
            Some(pool) => pool.health_check().await,
            None => Ok(true),
        }
    }
}
