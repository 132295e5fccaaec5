//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use suncube_core::config::AppConfig;
use suncube_database::DatabaseBackend;
use suncube_queue::JobQueue;
use suncube_service::JobService;
use suncube_storage::StorageBackend;
use suncube_worker::BroadcastEventBus;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    // ── Configuration ────────────────────────────────────────
    /// Application configuration
    pub config: Arc<AppConfig>,

    // ── Infrastructure ───────────────────────────────────────
    /// Job store, payment lookup and audit trail
    pub database: DatabaseBackend,
    /// Work queue
    pub queue: Arc<dyn JobQueue>,
    /// Artifact storage and download signing
    pub storage: StorageBackend,
    /// Job lifecycle event bus
    pub events: Arc<BroadcastEventBus>,

    // ── Services ─────────────────────────────────────────────
    /// Job submission and status service
    pub job_service: Arc<JobService>,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Wire the services over the given backends.
    pub fn new(
        config: AppConfig,
        database: DatabaseBackend,
        queue: Arc<dyn JobQueue>,
        storage: StorageBackend,
        events: Arc<BroadcastEventBus>,
    ) -> Self {
        let job_service = Arc::new(JobService::new(
            Arc::clone(&database.jobs),
            Arc::clone(&queue),
            Arc::clone(&storage.store),
            Arc::clone(&database.audit),
            events.clone(),
            config.worker.max_attempts,
            storage.url_ttl,
        ));

        Self {
            config: Arc::new(config),
            database,
            queue,
            storage,
            events,
            job_service,
            started_at: Instant::now(),
        }
    }
}
