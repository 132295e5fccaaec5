//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use chrono::Utc;
use http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use suncube_api::app::{Backends, build_worker};
use suncube_api::{AppState, build_router};
use suncube_core::config::AppConfig;
use suncube_core::types::{CustomerId, PaymentId};
use suncube_database::DatabaseBackend;
use suncube_database::memory::MemoryPaymentDirectory;
use suncube_entity::Payment;
use suncube_queue::memory::MemoryJobQueue;
use suncube_storage::StorageBackend;
use suncube_worker::BroadcastEventBus;

/// Test application over in-memory backends
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Connected backends, shared with the worker
    pub backends: Backends,
    /// Application config
    pub config: AppConfig,
    /// Payments known to the payment directory
    pub payments: Vec<PaymentId>,
    shutdown: watch::Sender<bool>,
    worker: Vec<JoinHandle<()>>,
}

impl TestApp {
    /// Create a new test application with two seeded payments and no worker.
    pub async fn new() -> Self {
        let mut config = AppConfig::default();
        config.storage.provider = "memory".to_string();
        config.worker.concurrency = 2;
        config.worker.poll_wait_ms = 20;
        config.worker.backoff_base_ms = 10;
        config.worker.backoff_cap_ms = 50;
        config.worker.reaper_interval_seconds = 1;

        let directory = MemoryPaymentDirectory::new();
        let payments: Vec<PaymentId> = (0..2)
            .map(|i| {
                let payment = test_payment(125_000 + i * 1_000);
                let id = payment.id;
                directory.insert(payment);
                id
            })
            .collect();

        let backends = Backends {
            database: DatabaseBackend::in_memory(directory),
            queue: Arc::new(MemoryJobQueue::new(Duration::from_secs(30))),
            storage: StorageBackend::connect(&config.storage)
                .await
                .expect("Failed to init storage"),
            events: Arc::new(BroadcastEventBus::new(256)),
        };

        let state = AppState::new(
            config.clone(),
            backends.database.clone(),
            Arc::clone(&backends.queue),
            backends.storage.clone(),
            backends.events.clone(),
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            router: build_router(state),
            backends,
            config,
            payments,
            shutdown,
            worker: Vec::new(),
        }
    }

    /// Create a test application with the worker pool and reaper running.
    pub async fn with_worker() -> Self {
        let mut app = Self::new().await;
        app.start_worker();
        app
    }

    /// Start the worker pool and reaper against this app's backends.
    pub fn start_worker(&mut self) {
        let (pool, reaper) = build_worker(&self.config, &self.backends);
        let pool_cancel = self.shutdown.subscribe();
        let reaper_cancel = self.shutdown.subscribe();
        self.worker.push(tokio::spawn(async move {
            pool.run(pool_cancel, Duration::from_secs(1)).await
        }));
        self.worker
            .push(tokio::spawn(async move { reaper.run(reaper_cancel).await }));
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for handle in self.worker.drain(..) {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    /// Submit an invoice request for `payment_id`
    pub async fn submit(&self, payment_id: &str) -> TestResponse {
        self.request(
            "POST",
            "/invoices/generate",
            Some(serde_json::json!({ "paymentId": payment_id })),
            None,
        )
        .await
    }

    /// Poll `GET /jobs/{id}` until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Value {
        let path = format!("/jobs/{job_id}");
        for _ in 0..200 {
            let response = self.request("GET", &path, None, None).await;
            assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
            let state = response.body["state"].as_str().unwrap_or_default();
            if state == "succeeded" || state == "dead_lettered" {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("Job {job_id} did not finish");
    }

    /// Make an HTTP request to the test app
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        actor: Option<&str>,
    ) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();

        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json");

        if let Some(actor) = actor {
            req = req.header("x-actor-id", actor);
        }

        let req = req
            .body(Body::from(body_str))
            .expect("Failed to build request");

        let (status, bytes) = self.send(req).await;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    /// Fetch raw bytes, e.g. an artifact download.
    pub async fn get_raw(&self, path: &str) -> (StatusCode, bytes::Bytes) {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(req).await
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, bytes::Bytes) {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
            .await
            .expect("Failed to read body");
        (status, body_bytes)
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}

/// Turn an absolute signed URL into a router-relative path.
pub fn relative_path(url: &str) -> String {
    let start = url.find("/artifacts/").expect("Not an artifact URL");
    url[start..].to_string()
}

fn test_payment(amount_cents: i64) -> Payment {
    Payment {
        id: PaymentId::new(),
        customer_id: CustomerId::new(),
        amount_cents,
        currency: "USD".to_string(),
        status: "paid".to_string(),
        description: Some("Residential solar installation".to_string()),
        created_at: Utc::now(),
    }
}
