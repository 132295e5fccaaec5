//! Task executor that dispatches jobs to registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use suncube_entity::{Artifact, Job, JobError, JobErrorKind, TaskType};

/// Trait for task handler implementations.
#[async_trait]
pub trait TaskHandler: Send + Sync + std::fmt::Debug {
    /// The task type this handler processes.
    fn task_type(&self) -> TaskType;

    /// Run one attempt of the job.
    ///
    /// Must be safe to repeat: a job may be executed more than once when a
    /// lease expires or a delivery is duplicated.
    async fn execute(&self, job: &Job) -> Result<Artifact, JobError>;
}

/// Dispatches jobs to the handler registered for their task type.
#[derive(Debug, Default)]
pub struct TaskExecutor {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl TaskExecutor {
    /// Create an executor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same task type.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let task_type = handler.task_type();
        info!(task_type = %task_type, "Registered task handler");
        self.handlers.insert(task_type, handler);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Execute one attempt of `job`.
    pub async fn execute(&self, job: &Job) -> Result<Artifact, JobError> {
        let handler = self.handlers.get(&job.task_type).ok_or_else(|| {
            JobError::new(
                JobErrorKind::UnknownTask,
                format!("No handler registered for task type '{}'", job.task_type),
            )
        })?;

        debug!(
            job_id = %job.id,
            task_type = %job.task_type,
            attempt = job.attempts + 1,
            max_attempts = job.max_attempts,
            "Executing job"
        );
        handler.execute(job).await
    }

    /// Whether a handler is registered for `task_type`.
    pub fn has_handler(&self, task_type: TaskType) -> bool {
        self.handlers.contains_key(&task_type)
    }

    /// Task types with a registered handler.
    pub fn registered_types(&self) -> Vec<TaskType> {
        self.handlers.keys().copied().collect()
    }
}
