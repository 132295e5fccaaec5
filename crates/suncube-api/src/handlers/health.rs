//! Health check handler.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use suncube_core::result::AppResult;

use crate::dto::response::HealthResponse;
use crate::state::AppState;

/// GET /health
///
/// `200` when every backend answers, `503` otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, queue, storage) = tokio::join!(
        state.database.health_check(),
        state.queue.health_check(),
        state.storage.store.health_check(),
    );
    let database = component_status(database);
    let queue = component_status(queue);
    let storage = component_status(storage);

    let healthy = [database, queue, storage].iter().all(|s| *s == "ok");
    let (code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            database: database.to_string(),
            queue: queue.to_string(),
            storage: storage.to_string(),
        }),
    )
}

fn component_status(result: AppResult<bool>) -> &'static str {
    match result {
        Ok(true) => "ok",
        Ok(false) => "unavailable",
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            "error"
        }
    }
}
