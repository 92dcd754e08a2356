//! Durable job queue abstraction.
//!
//! The queue guarantees at-least-once delivery: a dequeued job that is nacked
//! (or never acked by a crashed worker on a broker-backed implementation)
//! comes back, so every pipeline stage must be idempotent. The orchestrator
//! is a plain consumer of this interface, independent of any specific broker.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use vidra_core::models::ProcessingJob;

/// Maximum delay in seconds before redelivering a nacked job. Caps the
/// exponential backoff so high attempt counts do not produce excessive delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Backoff in seconds for a given attempt count (exponential with cap).
#[inline]
pub fn compute_retry_backoff_secs(attempts: u32) -> u64 {
    2_u64.saturating_pow(attempts).min(MAX_RETRY_BACKOFF_SECS)
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job for processing. Returns the job id.
    async fn enqueue(&self, job: ProcessingJob) -> Result<Uuid>;

    /// Claim the next available job, if any. The job stays in-flight until
    /// acked or nacked.
    async fn dequeue(&self) -> Result<Option<ProcessingJob>>;

    /// Acknowledge a terminal outcome; the job is not redelivered.
    async fn ack(&self, job_id: Uuid) -> Result<()>;

    /// Return a job for redelivery after `delay`. The passed job carries the
    /// updated attempt counter and accumulated errors.
    async fn nack_with_backoff(&self, job: ProcessingJob, delay: Duration) -> Result<()>;

    /// Abort jobs for a video: queued jobs are dropped and redeliveries for
    /// the video are suppressed. In-flight workers notice through the
    /// repository (the video record is gone) and stop producing artifacts.
    async fn cancel_video(&self, video_id: Uuid) -> Result<()>;
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<ProcessingJob>,
    in_flight: HashMap<Uuid, Uuid>, // job id -> video id
    cancelled: HashSet<Uuid>,       // video ids
}

/// In-memory queue for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queued (not in-flight) job count; test helper.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: ProcessingJob) -> Result<Uuid> {
        let job_id = job.id;
        let mut state = self.state.lock().await;
        if state.cancelled.contains(&job.video_id) {
            tracing::warn!(video_id = %job.video_id, "Refusing to enqueue job for cancelled video");
            return Ok(job_id);
        }
        tracing::info!(job_id = %job_id, video_id = %job.video_id, "Job enqueued");
        state.ready.push_back(job);
        Ok(job_id)
    }

    async fn dequeue(&self) -> Result<Option<ProcessingJob>> {
        let mut state = self.state.lock().await;
        while let Some(job) = state.ready.pop_front() {
            if state.cancelled.contains(&job.video_id) {
                tracing::info!(job_id = %job.id, "Dropping queued job for cancelled video");
                continue;
            }
            state.in_flight.insert(job.id, job.video_id);
            return Ok(Some(job));
        }
        Ok(None)
    }

    async fn ack(&self, job_id: Uuid) -> Result<()> {
        self.state.lock().await.in_flight.remove(&job_id);
        Ok(())
    }

    async fn nack_with_backoff(&self, job: ProcessingJob, delay: Duration) -> Result<()> {
        let state = self.state.clone();
        {
            let mut guard = state.lock().await;
            guard.in_flight.remove(&job.id);
            if guard.cancelled.contains(&job.video_id) {
                return Ok(());
            }
        }
        tracing::info!(
            job_id = %job.id,
            attempts = job.attempts,
            delay_secs = delay.as_secs_f64(),
            "Job scheduled for redelivery"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = state.lock().await;
            if !guard.cancelled.contains(&job.video_id) {
                guard.ready.push_back(job);
            }
        });
        Ok(())
    }

    async fn cancel_video(&self, video_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        state.cancelled.insert(video_id);
        state.ready.retain(|job| job.video_id != video_id);
        Ok(())
    }
}
