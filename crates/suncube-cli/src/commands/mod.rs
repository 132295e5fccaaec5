//! CLI command definitions and dispatch.

pub mod audit;
pub mod job;
pub mod migrate;
pub mod serve;
pub mod worker;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use suncube_core::config::AppConfig;
use suncube_core::error::AppError;

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// SunCube invoicing: asynchronous invoice generation
#[derive(Debug, Parser)]
#[command(name = "suncube", version, about, long_about = None)]
pub struct Cli {
    /// Configuration environment overlay (`config/<env>.toml`)
    #[arg(short, long, env = "SUNCUBE_ENV", default_value = "development")]
    pub env: String,

    /// Base URL of a running server, for client commands
    #[arg(short, long, env = "SUNCUBE_SERVER", default_value = "http://localhost:3000")]
    pub server: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server (and the worker unless disabled)
    Serve(serve::ServeArgs),
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Request an invoice for a payment
    Submit(job::SubmitArgs),
    /// Show a job's status
    Status(job::StatusArgs),
    /// Fetch a job's artifact link, or download the artifact
    Artifact(job::ArtifactArgs),
    /// Poll a job until it reaches a terminal state
    Wait(job::WaitArgs),
    /// List recent jobs
    Jobs(job::ListArgs),
    /// Worker management
    Worker(worker::WorkerArgs),
    /// Audit trail
    Audit(audit::AuditArgs),
}

impl Commands {
    /// Whether the command runs a long-lived service that sets up its own logging.
    pub fn runs_service(&self) -> bool {
        match self {
            Self::Serve(_) => true,
            Self::Worker(args) => args.runs_service(),
            _ => false,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let client = ApiClient::new(&self.server);
        match &self.command {
            Commands::Serve(args) => serve::execute(args, &self.env).await,
            Commands::Migrate(args) => migrate::execute(args, &self.env).await,
            Commands::Submit(args) => job::submit(args, &client, self.format).await,
            Commands::Status(args) => job::status(args, &client, self.format).await,
            Commands::Artifact(args) => job::artifact(args, &client, self.format).await,
            Commands::Wait(args) => job::wait(args, &client, self.format).await,
            Commands::Jobs(args) => job::list(args, &client, self.format).await,
            Commands::Worker(args) => worker::execute(args, &self.env, &client, self.format).await,
            Commands::Audit(args) => audit::execute(args, &self.env, self.format).await,
        }
    }
}

/// Helper: load configuration for an environment
pub fn load_config(env: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(env)
}

/// Helper: initialize logging for long-running commands
pub fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.format == "json" {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_submit_with_actor() {
        let cli = Cli::try_parse_from([
            "suncube",
            "submit",
            "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "--actor",
            "ops@suncube.io",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.actor.as_deref(), Some("ops@suncube.io"));
                assert!(!args.wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(!Cli::try_parse_from(["suncube", "jobs"]).unwrap().command.runs_service());
    }

    #[test]
    fn test_status_needs_job_or_payment() {
        assert!(Cli::try_parse_from(["suncube", "status"]).is_err());
        assert!(Cli::try_parse_from(["suncube", "status", "--payment", "abc"]).is_ok());
    }

    #[test]
    fn test_global_options_read_environment() {
        let cli = Cli::command();
        let env_of = |id: &str| {
            cli.get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|name| name.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("env").as_deref(), Some("SUNCUBE_ENV"));
        assert_eq!(env_of("server").as_deref(), Some("SUNCUBE_SERVER"));
    }

    #[test]
    fn test_service_commands() {
        let serve = Cli::try_parse_from(["suncube", "serve", "--no-worker"]).unwrap();
        assert!(serve.command.runs_service());
        let run = Cli::try_parse_from(["suncube", "worker", "run"]).unwrap();
        assert!(run.command.runs_service());
        let status = Cli::try_parse_from(["suncube", "worker", "status"]).unwrap();
        assert!(!status.command.runs_service());
    }
}
