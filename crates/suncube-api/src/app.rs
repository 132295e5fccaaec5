//! Process wiring: backends, worker pool, reaper, and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use suncube_core::config::AppConfig;
use suncube_core::error::AppError;
use suncube_core::result::AppResult;
use suncube_database::DatabaseBackend;
use suncube_queue::{JobQueue, QueueManager};
use suncube_storage::StorageBackend;
use suncube_worker::jobs::{GenerateInvoiceHandler, InvoiceRenderer};
use suncube_worker::render::PdfInvoiceRenderer;
use suncube_worker::{BroadcastEventBus, Reaper, TaskExecutor, WorkerPool};

use crate::router::build_router;
use crate::state::AppState;

/// Capacity of the in-process event bus.
const EVENT_BUS_CAPACITY: usize = 1024;

/// Every backend a process needs, connected from configuration.
#[derive(Debug, Clone)]
pub struct Backends {
    /// Job store, payments and audit trail.
    pub database: DatabaseBackend,
    /// Work queue.
    pub queue: Arc<dyn JobQueue>,
    /// Artifact storage.
    pub storage: StorageBackend,
    /// Lifecycle events.
    pub events: Arc<BroadcastEventBus>,
}

impl Backends {
    /// Connect the configured providers.
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        info!(provider = %config.database.provider, "Connecting job store...");
        let database = DatabaseBackend::connect(&config.database).await?;

        info!(provider = %config.queue.provider, "Connecting queue...");
        let queue = QueueManager::connect(&config.queue).await?;

        info!(provider = %config.storage.provider, "Connecting artifact storage...");
        let storage = StorageBackend::connect(&config.storage).await?;

        Ok(Self {
            database,
            queue,
            storage,
            events: Arc::new(BroadcastEventBus::new(EVENT_BUS_CAPACITY)),
        })
    }
}

/// Build the worker pool and reaper over connected backends.
pub fn build_worker(config: &AppConfig, backends: &Backends) -> (WorkerPool, Reaper) {
    let renderer = InvoiceRenderer::new(
        Arc::clone(&backends.database.payments),
        Arc::clone(&backends.storage.store),
        Arc::new(PdfInvoiceRenderer::new(config.worker.invoice_issuer.clone())),
    );
    let executor = TaskExecutor::new().with_handler(Arc::new(GenerateInvoiceHandler::new(renderer)));

    let pool = WorkerPool::new(
        Arc::clone(&backends.database.jobs),
        Arc::clone(&backends.queue),
        Arc::new(executor),
        backends.events.clone(),
        config.worker.clone(),
    );
    let reaper = Reaper::new(
        Arc::clone(&backends.database.jobs),
        Arc::clone(&backends.queue),
        backends.events.clone(),
        config.worker.reaper_interval(),
    )
    .with_stall_threshold(config.worker.requeue_stalled_after());
    (pool, reaper)
}

/// Spawn the worker pool and reaper; both stop when `cancel` flips.
fn spawn_worker(
    config: &AppConfig,
    backends: &Backends,
    cancel: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let (pool, reaper) = build_worker(config, backends);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    info!(
        worker_id = pool.worker_id(),
        concurrency = config.worker.concurrency,
        "Starting background worker"
    );

    let pool_cancel = cancel.clone();
    let reaper_cancel = cancel.clone();
    vec![
        tokio::spawn(async move { pool.run(pool_cancel, grace).await }),
        tokio::spawn(async move { reaper.run(reaper_cancel).await }),
    ]
}

/// Runs the HTTP server, plus the worker when `worker.enabled`.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    info!("Starting SunCube invoicing v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Connect backends ─────────────────────────────────
    let backends = Backends::connect(&config).await?;

    // ── Step 2: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 3: Start background worker ──────────────────────────
    let worker_handles = if config.worker.enabled {
        spawn_worker(&config, &backends, &shutdown_rx)
    } else {
        info!("Background worker disabled");
        Vec::new()
    };

    // ── Step 4: Build and start HTTP server ──────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = AppState::new(
        config,
        backends.database,
        backends.queue,
        backends.storage,
        backends.events,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    info!("SunCube invoicing listening on {addr}");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received, starting graceful shutdown...");
            let _ = shutdown_tx.send(true);
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 6: Wait for background tasks ────────────────────────
    wait_for(worker_handles, grace).await;
    info!("SunCube invoicing shut down gracefully");
    Ok(())
}

/// Runs only the worker pool and reaper, for dedicated worker processes.
pub async fn run_worker(config: AppConfig) -> Result<(), AppError> {
    if config.queue.provider == "memory" || config.database.provider == "memory" {
        warn!("Standalone worker on in-memory backends will not see jobs from other processes");
    }

    let backends = Backends::connect(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_worker(&config, &backends, &shutdown_rx);

    shutdown_signal().await;
    info!("Shutdown signal received, stopping worker...");
    let _ = shutdown_tx.send(true);

    wait_for(handles, Duration::from_secs(config.server.shutdown_grace_seconds)).await;
    Ok(())
}

async fn wait_for(handles: Vec<JoinHandle<()>>, grace: Duration) {
    if handles.is_empty() {
        return;
    }
    info!("Waiting for background tasks to complete...");
    let all = futures::future::join_all(handles);
    if tokio::time::timeout(grace + Duration::from_secs(1), all)
        .await
        .is_err()
    {
        warn!("Background tasks did not stop within the grace period");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
