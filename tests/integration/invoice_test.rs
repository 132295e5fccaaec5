//! Integration tests for invoice submission and artifact download.

use http::StatusCode;

use suncube_database::AuditSink;

use crate::helpers::{self, TestApp};

#[tokio::test]
async fn test_generate_invoice_end_to_end() {
    let app = TestApp::with_worker().await;
    let payment_id = app.payments[0].to_string();

    let response = app.submit(&payment_id).await;
    assert_eq!(response.status, StatusCode::ACCEPTED, "{:?}", response.body);
    assert_eq!(response.body["deduplicated"], false);
    let job_id = response.body["jobId"].as_str().unwrap().to_string();

    let job = app.wait_for_terminal(&job_id).await;
    assert_eq!(job["state"], "succeeded");
    assert_eq!(job["attempts"], 1);
    assert_eq!(job["idempotencyKey"], payment_id.as_str());
    assert_eq!(job["result"]["contentType"], "application/pdf");
    assert!(job.get("error").is_none());

    let link = app
        .request("GET", &format!("/jobs/{job_id}/artifact"), None, None)
        .await;
    assert_eq!(link.status, StatusCode::OK, "{:?}", link.body);
    assert!(link.body["expiresAt"].is_string());
    let url = link.body["url"].as_str().unwrap();

    let (status, bytes) = app.get_raw(&helpers::relative_path(url)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"%PDF"));
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains(&payment_id));

    app.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_submit_returns_same_job() {
    let app = TestApp::new().await;
    let payment_id = app.payments[1].to_string();

    let first = app.submit(&payment_id).await;
    assert_eq!(first.status, StatusCode::ACCEPTED);

    let second = app.submit(&payment_id.to_uppercase()).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["deduplicated"], true);
    assert_eq!(second.body["jobId"], first.body["jobId"]);

    let by_payment = app
        .request("GET", &format!("/invoices/{payment_id}/job"), None, None)
        .await;
    assert_eq!(by_payment.status, StatusCode::OK);
    assert_eq!(by_payment.body["jobId"], first.body["jobId"]);
}

#[tokio::test]
async fn test_unknown_payment_is_dead_lettered() {
    let app = TestApp::with_worker().await;
    let missing = suncube_core::types::PaymentId::new().to_string();

    let response = app.submit(&missing).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    let job_id = response.body["jobId"].as_str().unwrap().to_string();

    let job = app.wait_for_terminal(&job_id).await;
    assert_eq!(job["state"], "dead_lettered");
    assert_eq!(job["attempts"], 1);
    assert_eq!(job["error"]["kind"], "PaymentNotFound");

    let link = app
        .request("GET", &format!("/jobs/{job_id}/artifact"), None, None)
        .await;
    assert_eq!(link.status, StatusCode::CONFLICT);
    assert_eq!(link.body["error"], "NOT_READY");

    app.shutdown().await;
}

#[tokio::test]
async fn test_invalid_payloads_are_rejected() {
    let app = TestApp::new().await;

    let not_uuid = app.submit("not-a-payment").await;
    assert_eq!(not_uuid.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_uuid.body["error"], "VALIDATION_ERROR");

    let empty = app.submit("").await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let wrong_shape = app
        .request(
            "POST",
            "/invoices/generate",
            Some(serde_json::json!({ "payment": 42 })),
            None,
        )
        .await;
    assert_eq!(wrong_shape.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_records_actor_in_audit_trail() {
    let app = TestApp::new().await;
    let payment_id = app.payments[0];

    let response = app
        .request(
            "POST",
            "/invoices/generate",
            Some(serde_json::json!({ "paymentId": payment_id.to_string() })),
            Some("billing@suncube.io"),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let entries = app
        .backends
        .database
        .audit
        .find_by_resource("payments", &payment_id.to_string())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "GENERATE_INVOICE");
    assert_eq!(entries[0].actor.as_deref(), Some("billing@suncube.io"));
    assert_eq!(entries[0].meta["deduplicated"], false);
}

#[tokio::test]
async fn test_download_requires_valid_token() {
    let app = TestApp::with_worker().await;
    let payment_id = app.payments[0].to_string();
    let response = app.submit(&payment_id).await;
    let job_id = response.body["jobId"].as_str().unwrap().to_string();
    let job = app.wait_for_terminal(&job_id).await;
    let key = job["result"]["storageKey"].as_str().unwrap();

    let (status, _) = app.get_raw(&format!("/artifacts/{key}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .get_raw(&format!("/artifacts/{key}?token=forged"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.shutdown().await;
}
