//! Route definitions for the SunCube HTTP API.
//!
//! The router receives `AppState` and passes it to all handlers via Axum's
//! `State` extractor.

use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let body_limit = server.body_limit_bytes;
    let timeout = Duration::from_secs(server.request_timeout_seconds);
    let cors = build_cors_layer(&server.cors);

    Router::new()
        .merge(invoice_routes())
        .merge(job_routes())
        .merge(artifact_routes())
        .merge(health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// Invoice submission and lookup by payment
fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/invoices/generate", post(handlers::invoice::generate_invoice))
        .route("/invoices/{payment_id}/job", get(handlers::invoice::get_invoice_job))
}

/// Job status, artifact links, stats and the event stream
fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(handlers::job::list_jobs))
        .route("/jobs/stats", get(handlers::job::stats))
        .route("/jobs/events", get(handlers::job::events))
        .route("/jobs/{job_id}", get(handlers::job::get_job))
        .route("/jobs/{job_id}/artifact", get(handlers::job::get_artifact))
}

/// Signed artifact downloads
fn artifact_routes() -> Router<AppState> {
    Router::new().route("/artifacts/{*key}", get(handlers::artifact::download))
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, header};
    use tower::ServiceExt;

    use suncube_core::config::AppConfig;
    use suncube_database::DatabaseBackend;
    use suncube_database::memory::MemoryPaymentDirectory;
    use suncube_queue::memory::MemoryJobQueue;
    use suncube_storage::StorageBackend;
    use suncube_worker::BroadcastEventBus;

    use super::*;

    async fn router() -> Router {
        let mut config = AppConfig::default();
        config.storage.provider = "memory".to_string();
        let storage = StorageBackend::connect(&config.storage).await.unwrap();
        let state = AppState::new(
            config,
            DatabaseBackend::in_memory(MemoryPaymentDirectory::new()),
            Arc::new(MemoryJobQueue::new(Duration::from_secs(30))),
            storage,
            Arc::new(BroadcastEventBus::new(16)),
        );
        build_router(state)
    }

    #[tokio::test]
    async fn test_layered_router_serves_requests() {
        let app = router().await;

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/jobs/stats")
                    .header(header::ACCEPT_ENCODING, "gzip")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = router()
            .await
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
