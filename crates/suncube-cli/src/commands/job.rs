//! Client commands against the Status API.

use std::time::Duration;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use suncube_api::dto::request::GenerateInvoiceRequest;
use suncube_api::dto::response::{
    ArtifactUrlResponse, JobListResponse, JobResponse, SubmitResponse,
};
use suncube_core::error::AppError;
use suncube_entity::JobState;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Arguments for `submit`
#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Payment ID (UUID)
    pub payment_id: String,
    /// Actor recorded in the audit trail
    #[arg(long)]
    pub actor: Option<String>,
    /// Wait for the job to finish
    #[arg(short, long)]
    pub wait: bool,
    /// Seconds to wait with `--wait`
    #[arg(long, default_value = "60")]
    pub timeout: u64,
}

/// Arguments for `status`
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Job ID
    #[arg(required_unless_present = "payment")]
    pub job_id: Option<String>,
    /// Look up the latest job for a payment instead
    #[arg(short, long, conflicts_with = "job_id")]
    pub payment: Option<String>,
}

/// Arguments for `artifact`
#[derive(Debug, Args)]
pub struct ArtifactArgs {
    /// Job ID
    pub job_id: String,
    /// Download the artifact to this file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for `wait`
#[derive(Debug, Args)]
pub struct WaitArgs {
    /// Job ID
    pub job_id: String,
    /// Give up after this many seconds
    #[arg(long, default_value = "60")]
    pub timeout: u64,
    /// Poll interval in milliseconds
    #[arg(long, default_value = "500")]
    pub interval_ms: u64,
}

/// Arguments for `jobs`
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Number of jobs
    #[arg(short, long, default_value = "20")]
    pub limit: u32,
}

/// Job display row
#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    /// Job ID
    job_id: String,
    /// State
    state: String,
    /// Attempts
    attempts: String,
    /// Idempotency key
    key: String,
    /// Created
    created: String,
}

impl From<&JobResponse> for JobRow {
    fn from(job: &JobResponse) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            state: job.state.to_string(),
            attempts: format!("{}/{}", job.attempts, job.max_attempts),
            key: job.idempotency_key.clone(),
            created: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// POST /invoices/generate
pub async fn submit(
    args: &SubmitArgs,
    client: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    let body = GenerateInvoiceRequest {
        payment_id: args.payment_id.clone(),
    };
    let submitted: SubmitResponse = client
        .post("/invoices/generate", &body, args.actor.as_deref())
        .await?;

    if args.wait {
        let job = poll_until_done(
            client,
            &submitted.job_id.to_string(),
            Duration::from_secs(args.timeout),
            Duration::from_millis(500),
        )
        .await?;
        return print_job(&job, format);
    }

    match format {
        OutputFormat::Json => output::print_json(&submitted),
        OutputFormat::Table => {
            if submitted.deduplicated {
                output::print_warning("A job for this payment already exists");
            } else {
                output::print_success("Invoice generation queued");
            }
            output::print_kv("Job ID", &submitted.job_id.to_string());
            output::print_kv("State", submitted.state.as_str());
        }
    }
    Ok(())
}

/// GET /jobs/{id} or /invoices/{payment_id}/job
pub async fn status(
    args: &StatusArgs,
    client: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    let path = match (&args.job_id, &args.payment) {
        (_, Some(payment)) => format!("/invoices/{payment}/job"),
        (Some(job_id), None) => format!("/jobs/{job_id}"),
        (None, None) => return Err(AppError::validation("Either a job ID or --payment is required")),
    };
    let job: JobResponse = client.get(&path).await?;
    print_job(&job, format)
}

/// GET /jobs/{id}/artifact
pub async fn artifact(
    args: &ArtifactArgs,
    client: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    let link: ArtifactUrlResponse = client
        .get(&format!("/jobs/{}/artifact", args.job_id))
        .await?;

    if let Some(path) = &args.output {
        let data = client.download(&link.url).await?;
        tokio::fs::write(path, &data)
            .await
            .map_err(|e| AppError::internal(format!("Failed to write '{path}': {e}")))?;
        output::print_success(&format!("Saved {} bytes to {path}", data.len()));
        return Ok(());
    }

    match format {
        OutputFormat::Json => output::print_json(&link),
        OutputFormat::Table => {
            output::print_kv("URL", &link.url);
            output::print_kv("Expires", &link.expires_at.to_rfc3339());
        }
    }
    Ok(())
}

/// Poll GET /jobs/{id} until terminal
pub async fn wait(args: &WaitArgs, client: &ApiClient, format: OutputFormat) -> Result<(), AppError> {
    let job = poll_until_done(
        client,
        &args.job_id,
        Duration::from_secs(args.timeout),
        Duration::from_millis(args.interval_ms.max(50)),
    )
    .await?;
    print_job(&job, format)
}

/// GET /jobs
pub async fn list(args: &ListArgs, client: &ApiClient, format: OutputFormat) -> Result<(), AppError> {
    let jobs: JobListResponse = client.get(&format!("/jobs?limit={}", args.limit)).await?;
    let rows: Vec<JobRow> = jobs.items.iter().map(JobRow::from).collect();
    output::print_list(&rows, format);
    Ok(())
}

async fn poll_until_done(
    client: &ApiClient,
    job_id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<JobResponse, AppError> {
    let path = format!("/jobs/{job_id}");
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job: JobResponse = client.get(&path).await?;
        if job.state.is_terminal() {
            return Ok(job);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AppError::not_ready(format!(
                "Job {job_id} still {} after {}s",
                job.state,
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

fn print_job(job: &JobResponse, format: OutputFormat) -> Result<(), AppError> {
    if format == OutputFormat::Json {
        output::print_json(job);
        return Ok(());
    }

    output::print_kv("Job ID", &job.job_id.to_string());
    output::print_kv("Idempotency key", &job.idempotency_key);
    output::print_kv("State", job.state.as_str());
    output::print_kv("Attempts", &format!("{}/{}", job.attempts, job.max_attempts));
    if let Some(result) = &job.result {
        output::print_kv("Artifact", &result.storage_key);
        output::print_kv("Size", &format!("{} bytes", result.size_bytes));
    }
    if let Some(error) = &job.error {
        output::print_kv("Last error", &error.to_string());
    }
    if let Some(at) = job.next_attempt_at {
        output::print_kv("Next attempt", &at.to_rfc3339());
    }
    if job.state == JobState::DeadLettered {
        output::print_warning("Job was dead-lettered and will not be retried");
    }
    Ok(())
}
