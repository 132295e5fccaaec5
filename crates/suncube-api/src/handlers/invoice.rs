//! Invoice request handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use suncube_service::RequestContext;

use crate::dto::request::GenerateInvoiceRequest;
use crate::dto::response::{JobResponse, SubmitResponse};
use crate::error::ApiResult;
use crate::extractors::{Actor, ValidatedJson};
use crate::state::AppState;

/// POST /invoices/generate
///
/// `202 Accepted` when a new job was queued, `200 OK` when an existing job
/// for the payment was returned.
pub async fn generate_invoice(
    State(state): State<AppState>,
    Actor(actor): Actor,
    ValidatedJson(req): ValidatedJson<GenerateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let ctx = RequestContext::new(actor);
    let submission = state
        .job_service
        .submit_invoice(&ctx, &req.payment_id)
        .await?;

    let status = if submission.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(SubmitResponse::from(&submission))))
}

/// GET /invoices/{payment_id}/job
pub async fn get_invoice_job(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let status = state.job_service.get_invoice_status(&payment_id).await?;
    Ok(Json(status.into()))
}
