//! Integration tests for job status, listing, stats and health.

use http::StatusCode;

use crate::helpers::TestApp;

#[tokio::test]
async fn test_unknown_and_malformed_job_ids() {
    let app = TestApp::new().await;

    let unknown = app
        .request(
            "GET",
            &format!("/jobs/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.body["error"], "NOT_FOUND");

    let malformed = app.request("GET", "/jobs/not-a-uuid", None, None).await;
    assert_eq!(malformed.status, StatusCode::NOT_FOUND);

    let artifact = app
        .request("GET", "/jobs/not-a-uuid/artifact", None, None)
        .await;
    assert_eq!(artifact.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_artifact_not_ready_while_queued() {
    let app = TestApp::new().await;
    let response = app.submit(&app.payments[0].to_string()).await;
    let job_id = response.body["jobId"].as_str().unwrap();

    let job = app
        .request("GET", &format!("/jobs/{job_id}"), None, None)
        .await;
    assert_eq!(job.status, StatusCode::OK);
    assert_eq!(job.body["state"], "queued");
    assert_eq!(job.body["attempts"], 0);

    let link = app
        .request("GET", &format!("/jobs/{job_id}/artifact"), None, None)
        .await;
    assert_eq!(link.status, StatusCode::CONFLICT);
    assert_eq!(link.body["error"], "NOT_READY");
}

#[tokio::test]
async fn test_list_jobs_and_stats() {
    let app = TestApp::new().await;
    for payment in &app.payments {
        let response = app.submit(&payment.to_string()).await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
    }

    let list = app.request("GET", "/jobs?limit=1", None, None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body["items"].as_array().unwrap().len(), 1);

    let stats = app.request("GET", "/jobs/stats", None, None).await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["total"], 2);
    assert_eq!(stats.body["jobs"]["queued"], 2);
    assert_eq!(stats.body["jobs"]["dead_lettered"], 0);
    assert_eq!(stats.body["queue"]["ready"], 2);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let response = app.request("GET", "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["database"], "ok");
    assert_eq!(response.body["queue"], "ok");
    assert_eq!(response.body["storage"], "ok");
}
