//! Job status, artifact link, stats, and event stream handlers.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::dto::request::{EventsQuery, ListJobsQuery};
use crate::dto::response::{ArtifactUrlResponse, JobListResponse, JobResponse, StatsResponse};
use crate::error::ApiResult;
use crate::extractors::parse_job_id;
use crate::state::AppState;

/// Page size when `limit` is omitted.
const DEFAULT_LIST_LIMIT: u32 = 20;

/// GET /jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let status = state.job_service.get_status(job_id).await?;
    Ok(Json(status.into()))
}

/// GET /jobs/{job_id}/artifact
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ArtifactUrlResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let link = state.job_service.get_artifact_url(job_id).await?;
    Ok(Json(link.into()))
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let jobs = state
        .job_service
        .list_recent(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(JobListResponse {
        items: jobs.into_iter().map(JobResponse::from).collect(),
    }))
}

/// GET /jobs/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.job_service.stats().await?;
    Ok(Json(stats.into()))
}

/// GET /jobs/events
///
/// Streams job lifecycle events as Server-Sent Events. The SSE event name is
/// the event kind; the data is the JSON-encoded event.
pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let only = query.job_id.as_deref().map(parse_job_id).transpose()?;

    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(move |msg| match msg {
        Ok(event) if only.is_none_or(|id| id == event.job_id) => Event::default()
            .event(event.kind.as_str())
            .json_data(&event)
            .ok()
            .map(Ok),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "Event stream subscriber lagged");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
