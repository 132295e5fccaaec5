//! Signed artifact downloads served by this instance.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use suncube_core::error::AppError;

use crate::dto::request::DownloadQuery;
use crate::error::ApiResult;
use crate::state::AppState;

/// GET /artifacts/{*key}?token=
pub async fn download(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let key = key.trim_start_matches('/');
    let signer = state
        .storage
        .signer
        .as_ref()
        .ok_or_else(|| AppError::not_found("Artifacts are not served by this instance"))?;
    let token = query
        .token
        .ok_or_else(|| AppError::forbidden("Missing download token"))?;
    signer.verify(&token, key)?;

    let data = state.storage.store.get(key).await?;
    debug!(key, bytes = data.len(), "Serving artifact");

    let filename = key.rsplit('/').next().unwrap_or(key);
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(key).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
            (header::CACHE_CONTROL, "private, no-store".to_string()),
        ],
        data,
    )
        .into_response())
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
