//! Worker pool: bounded concurrency, polling, retry with backoff, timeouts.
//!
//! Shutdown: [`WorkerPool::shutdown`] signals the pool to stop claiming jobs;
//! it does not wait for in-flight jobs. For graceful shutdown, coordinate with
//! your runtime and allow time for running jobs to finish before process exit.

use anyhow::Result;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use vidra_core::models::ProcessingJob;

use crate::context::JobHandlerContext;
use crate::queue::{compute_retry_backoff_secs, JobQueue};

#[derive(Clone)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Wall-clock budget for a single job attempt.
    pub job_timeout_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            job_timeout_secs: 3600,
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    shutdown_tx: mpsc::Sender<()>,
}

impl WorkerPool {
    /// Create a pool with a weak reference to the dispatch context and start
    /// its claim loop.
    pub fn new(
        queue: Arc<dyn JobQueue>,
        config: WorkerPoolConfig,
        context: Weak<dyn JobHandlerContext>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let queue_clone = queue.clone();
        tokio::spawn(async move {
            Self::worker_loop(queue_clone, config, context, shutdown_rx).await;
        });

        Self { queue, shutdown_tx }
    }

    /// Submit a job for processing.
    pub async fn submit(&self, job: ProcessingJob) -> Result<uuid::Uuid> {
        self.queue.enqueue(job).await
    }

    async fn worker_loop(
        queue: Arc<dyn JobQueue>,
        config: WorkerPoolConfig,
        context: Weak<dyn JobHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "Worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let job_timeout = Duration::from_secs(config.job_timeout_secs);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Worker pool shutting down");
                    break;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&queue, &semaphore, &context, job_timeout).await;
                }
            }
        }

        tracing::info!("Worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        queue: &Arc<dyn JobQueue>,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn JobHandlerContext>,
        job_timeout: Duration,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match queue.dequeue().await {
            Ok(Some(job)) => {
                let queue = queue.clone();
                let ctx = context.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) =
                        Self::process_job_with_retry(job, queue, ctx, job_timeout).await
                    {
                        tracing::error!(error = %e, "Job processing failed after retries");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job from queue");
            }
        }
    }

    #[tracing::instrument(skip(queue, context), fields(job.id = %job.id, video.id = %job.video_id))]
    async fn process_job_with_retry(
        job: ProcessingJob,
        queue: Arc<dyn JobQueue>,
        context: Weak<dyn JobHandlerContext>,
        job_timeout: Duration,
    ) -> Result<()> {
        let ctx = context.upgrade().ok_or_else(|| {
            anyhow::anyhow!("JobHandlerContext was dropped, cannot process job")
        })?;

        let result = tokio::time::timeout(job_timeout, ctx.clone().run_job(&job)).await;

        match result {
            Ok(Ok(())) => {
                queue.ack(job.id).await?;
                tracing::info!(job_id = %job.id, "Job completed successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                let recoverable = e.is_recoverable();
                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    attempts = job.attempts,
                    max_attempts = job.max_attempts,
                    recoverable = recoverable,
                    "Job execution failed"
                );

                // An unrecoverable error is terminal regardless of budget.
                if !recoverable {
                    ctx.on_terminal_failure(&job, e.to_string()).await;
                    queue.ack(job.id).await?;
                    return Err(e.into());
                }

                if job.can_retry() {
                    Self::schedule_retry(job, queue, e.to_string()).await
                } else {
                    ctx.on_terminal_failure(&job, e.to_string()).await;
                    queue.ack(job.id).await?;
                    tracing::error!("Job failed after max attempts");
                    Err(e.into())
                }
            }
            Err(_) => {
                tracing::error!(
                    job_id = %job.id,
                    timeout_secs = job_timeout.as_secs(),
                    "Job execution timed out"
                );
                let message = format!("job timed out after {}s", job_timeout.as_secs());
                if job.can_retry() {
                    Self::schedule_retry(job, queue, message).await
                } else {
                    ctx.on_terminal_failure(&job, message.clone()).await;
                    queue.ack(job.id).await?;
                    Err(anyhow::anyhow!(message))
                }
            }
        }
    }

    async fn schedule_retry(
        mut job: ProcessingJob,
        queue: Arc<dyn JobQueue>,
        error: String,
    ) -> Result<()> {
        let backoff_secs = compute_retry_backoff_secs(job.attempts);
        job.attempts += 1;
        job.errors.push(error);
        tracing::info!(
            job_id = %job.id,
            attempts = job.attempts,
            backoff_secs = backoff_secs,
            "Scheduling job retry"
        );
        queue
            .nack_with_backoff(job, Duration::from_secs(backoff_secs))
            .await
    }

    /// Signals the pool to stop claiming new jobs and exit the claim loop.
    ///
    /// Returns immediately after sending the signal; already-spawned job
    /// handlers continue running until they complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}
