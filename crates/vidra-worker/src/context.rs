//! Job handler context trait
//!
//! The service layer implements this trait for its application state. The
//! worker pool calls `run_job` when processing a claimed job and
//! `on_terminal_failure` when a job has exhausted its retries or failed
//! unrecoverably.

use async_trait::async_trait;
use std::sync::Arc;

use vidra_core::models::ProcessingJob;
use vidra_core::JobError;

/// Context for job execution.
///
/// Implemented by the service layer's application state. The worker pool
/// holds a weak reference so that dropping the application state stops job
/// dispatch without a reference cycle.
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Run a processing job to completion. Errors carry a recoverable flag
    /// that decides whether the pool schedules a retry.
    async fn run_job(self: Arc<Self>, job: &ProcessingJob) -> Result<(), JobError>;

    /// Called once when a job will never run again: either its error was
    /// unrecoverable or its retry budget is spent. Implementations mark the
    /// owning video as failed here.
    async fn on_terminal_failure(self: Arc<Self>, job: &ProcessingJob, error: String);
}
