//! Job dispatch context.
//!
//! Bridges the worker pool to the processing pipeline: the pool holds a weak
//! reference to this context and calls it for every claimed job.

use async_trait::async_trait;
use std::sync::Arc;

use vidra_core::models::{ProcessingJob, VideoStatus};
use vidra_core::{state, EventSink, JobError, VideoEvent, VideoRepository};
use vidra_processing::ProcessingPipeline;
use vidra_worker::JobHandlerContext;

pub struct ServiceContext {
    pipeline: Arc<ProcessingPipeline>,
    repo: Arc<dyn VideoRepository>,
    events: Arc<dyn EventSink>,
}

impl ServiceContext {
    pub fn new(
        pipeline: Arc<ProcessingPipeline>,
        repo: Arc<dyn VideoRepository>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            repo,
            events,
        })
    }
}

#[async_trait]
impl JobHandlerContext for ServiceContext {
    async fn run_job(self: Arc<Self>, job: &ProcessingJob) -> Result<(), JobError> {
        self.pipeline.run(job).await
    }

    /// The job will never run again; make sure the video record reflects the
    /// terminal failure even if the attempt died before the pipeline could
    /// record it (e.g. a timeout).
    async fn on_terminal_failure(self: Arc<Self>, job: &ProcessingJob, error: String) {
        tracing::error!(
            job_id = %job.id,
            video_id = %job.video_id,
            error = %error,
            "Processing job failed terminally"
        );

        let Ok(Some(mut video)) = self.repo.get(job.video_id).await else {
            return;
        };
        if video.status != VideoStatus::Processing {
            return;
        }
        video.processing_errors.push(error);
        if state::transition(&mut video, VideoStatus::Failed, job.max_attempts).is_err() {
            return;
        }
        if self.repo.save(&video).await.is_ok() {
            self.events
                .record(VideoEvent::ProcessingFailed {
                    video_id: video.id,
                    errors: video.processing_errors.clone(),
                })
                .await;
        }
    }
}
