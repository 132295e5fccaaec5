//! Worker pool commands.

use clap::{Args, Subcommand};

use suncube_api::dto::response::StatsResponse;
use suncube_core::error::AppError;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Show job counts and queue depth
    Status,
    /// Run a standalone worker process (no HTTP server)
    Run {
        /// Override the number of concurrent workers
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
}

impl WorkerArgs {
    /// Whether this invocation runs the worker itself.
    pub fn runs_service(&self) -> bool {
        matches!(self.command, WorkerCommand::Run { .. })
    }
}

/// Execute worker commands
pub async fn execute(
    args: &WorkerArgs,
    env: &str,
    client: &ApiClient,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        WorkerCommand::Status => {
            let stats: StatsResponse = client.get("/jobs/stats").await?;
            if format == OutputFormat::Json {
                output::print_json(&stats);
                return Ok(());
            }
            for (state, count) in &stats.jobs {
                output::print_kv(state, &count.to_string());
            }
            output::print_kv("total", &stats.total.to_string());
            output::print_kv("queue ready", &stats.queue.ready.to_string());
            output::print_kv("queue in flight", &stats.queue.in_flight.to_string());
            Ok(())
        }
        WorkerCommand::Run { concurrency } => {
            let mut config = super::load_config(env)?;
            if let Some(n) = concurrency {
                config.worker.concurrency = (*n).max(1);
            }
            super::init_logging(&config);
            suncube_api::run_worker(config).await
        }
    }
}
