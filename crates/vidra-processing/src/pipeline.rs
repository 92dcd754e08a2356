//! Processing pipeline orchestration.
//!
//! One [`ProcessingPipeline::run`] call executes a full processing attempt:
//! download source → probe → thumbnail/preview → bounded-parallel transcodes
//! → manifest assembly → outcome. Every stage is idempotent and checks
//! already-persisted results first, so redelivery of the same job converges
//! instead of duplicating work. The video record is re-read at stage
//! boundaries; if it disappeared (deletion during processing), the attempt
//! aborts without producing further artifacts.

use anyhow::anyhow;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use vidra_core::models::{
    ProcessingJob, QualityVariant, SourceMetadata, VariantStatus, Video, VideoStatus,
};
use vidra_core::{state, EventSink, JobError, VideoEvent, VideoRepository};
use vidra_storage::{artifact_key, CdnGateway, StorageError};

use crate::manifest::{build_dash_mpd, build_hls_master};
use crate::probe::MediaProbe;
use crate::transcode::{applicable_profiles, QualityProfile, Transcoder, WatermarkOverlay};

#[derive(Clone)]
pub struct PipelineConfig {
    /// Upper bound on simultaneous ffmpeg encodes within one job.
    pub max_concurrent_transcodes: usize,
    pub thumbnail_offset_secs: f64,
    pub preview_duration_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transcodes: 2,
            thumbnail_offset_secs: 5.0,
            preview_duration_secs: 6.0,
        }
    }
}

pub struct ProcessingPipeline {
    repo: Arc<dyn VideoRepository>,
    gateway: Arc<CdnGateway>,
    probe: Arc<dyn MediaProbe>,
    transcoder: Arc<dyn Transcoder>,
    events: Arc<dyn EventSink>,
    config: PipelineConfig,
}

/// Persist the video only while its record still exists. Returns false when
/// the video was deleted, which aborts the surrounding stage.
async fn save_if_present(repo: &Arc<dyn VideoRepository>, video: &Video) -> bool {
    match repo.get(video.id).await {
        Ok(Some(_)) => repo.save(video).await.is_ok(),
        Ok(None) => false,
        Err(e) => {
            tracing::error!(video_id = %video.id, error = %e, "Repository save failed");
            false
        }
    }
}

impl ProcessingPipeline {
    pub fn new(
        repo: Arc<dyn VideoRepository>,
        gateway: Arc<CdnGateway>,
        probe: Arc<dyn MediaProbe>,
        transcoder: Arc<dyn Transcoder>,
        events: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            probe,
            transcoder,
            events,
            config,
        }
    }

    /// Execute one processing attempt for `job`.
    #[tracing::instrument(skip(self, job), fields(job.id = %job.id, video.id = %job.video_id))]
    pub async fn run(&self, job: &ProcessingJob) -> Result<(), JobError> {
        match self.run_inner(job).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.mark_attempt_failed(job, &e).await;
                Err(e)
            }
        }
    }

    async fn run_inner(&self, job: &ProcessingJob) -> Result<(), JobError> {
        let mut video = match self.repo.get(job.video_id).await.map_err(JobError::recoverable)? {
            Some(video) => video,
            None => {
                tracing::info!("Video deleted, dropping processing job");
                return Ok(());
            }
        };

        // Duplicate delivery after a successful attempt: nothing to do.
        if video.status == VideoStatus::Ready {
            tracing::info!("Video already READY, skipping redelivered job");
            return Ok(());
        }

        if video.status != VideoStatus::Processing {
            state::transition(&mut video, VideoStatus::Processing, job.max_attempts)
                .map_err(|e| JobError::unrecoverable(anyhow!(e)))?;
        }
        video.attempts = job.attempts + 1;
        self.repo.save(&video).await.map_err(JobError::recoverable)?;
        self.events
            .record(VideoEvent::ProcessingStarted {
                video_id: video.id,
                attempt: video.attempts,
            })
            .await;

        let staging = TempDir::new().map_err(JobError::recoverable)?;
        let work_dir = staging.path().to_path_buf();

        let source = match self.gateway.fetch(&job.source_key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(key)) => {
                return Err(JobError::unrecoverable(anyhow!(
                    "source artifact {key} is gone"
                )));
            }
            Err(e) => return Err(JobError::recoverable(e)),
        };
        let input_path = work_dir.join("source.mp4");
        tokio::fs::write(&input_path, &source)
            .await
            .map_err(JobError::recoverable)?;
        drop(source);

        // Probe once; metadata persisted from an earlier attempt is reused.
        let metadata = match video.metadata.clone() {
            Some(metadata) => metadata,
            None => {
                let metadata = self.probe.probe(&input_path).await?;
                tracing::info!(
                    duration = metadata.duration,
                    resolution = %format!("{}x{}", metadata.width, metadata.height),
                    codec = %metadata.video_codec,
                    "Source metadata extracted"
                );
                video.metadata = Some(metadata.clone());
                if !save_if_present(&self.repo, &video).await {
                    return Ok(());
                }
                metadata
            }
        };

        self.thumbnail_stage(&mut video, job, &input_path, &work_dir, &metadata)
            .await;
        self.preview_stage(&mut video, job, &input_path, &work_dir, &metadata)
            .await;
        if !save_if_present(&self.repo, &video).await {
            return Ok(());
        }

        let profiles = applicable_profiles(&job.settings.quality_levels, metadata.height);
        if profiles.is_empty() {
            return Err(JobError::unrecoverable(anyhow!(
                "no applicable quality profiles for {:?}",
                job.settings.quality_levels
            )));
        }
        for profile in &profiles {
            if video.variant(&profile.label).is_none() {
                video.variants.push(QualityVariant::new(
                    video.id,
                    &profile.label,
                    profile.width,
                    profile.height,
                    profile.bitrate_kbps,
                ));
            }
        }
        if !save_if_present(&self.repo, &video).await {
            return Ok(());
        }

        let watermark = self.stage_watermark(&mut video, job, &work_dir).await;

        let mut video = self
            .transcode_stage(video, &profiles, &input_path, &work_dir, watermark)
            .await;

        if self
            .repo
            .get(video.id)
            .await
            .map_err(JobError::recoverable)?
            .is_none()
        {
            tracing::info!("Video deleted during transcoding, aborting");
            return Ok(());
        }

        self.manifest_stage(&mut video, job, &metadata).await?;

        let completed = video.completed_variants().len();
        let min_required = job.settings.min_completed_variants.max(1);
        if completed >= min_required {
            state::transition(&mut video, VideoStatus::Ready, job.max_attempts)
                .map_err(|e| JobError::unrecoverable(anyhow!(e)))?;
            self.repo.save(&video).await.map_err(JobError::recoverable)?;
            self.events
                .record(VideoEvent::ProcessingCompleted {
                    video_id: video.id,
                    completed_variants: completed,
                })
                .await;
            tracing::info!(completed_variants = completed, "Video processing completed");
            Ok(())
        } else {
            for variant in &video.variants {
                if let Some(error) = &variant.error {
                    video
                        .processing_errors
                        .push(format!("{}: {error}", variant.quality));
                }
            }
            save_if_present(&self.repo, &video).await;
            Err(JobError::recoverable(anyhow!(
                "only {completed}/{min_required} required variants completed"
            )))
        }
    }

    /// Record the failed attempt on the video: PROCESSING → FAILED plus the
    /// error message, so the record is inspectable between retries.
    async fn mark_attempt_failed(&self, job: &ProcessingJob, error: &JobError) {
        let Ok(Some(mut video)) = self.repo.get(job.video_id).await else {
            return;
        };
        if video.status != VideoStatus::Processing {
            return;
        }
        video.processing_errors.push(error.to_string());
        if let Err(e) = state::transition(&mut video, VideoStatus::Failed, job.max_attempts) {
            tracing::error!(error = %e, "Could not mark video FAILED");
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

    async fn thumbnail_stage(
        &self,
        video: &mut Video,
        job: &ProcessingJob,
        input: &PathBuf,
        work_dir: &PathBuf,
        metadata: &SourceMetadata,
    ) {
        if !job.settings.generate_thumbnail || video.thumbnail_key.is_some() {
            return;
        }
        let offset = self.config.thumbnail_offset_secs.min(metadata.duration / 2.0);
        let output = work_dir.join("thumbnail.jpg");
        let result = async {
            self.transcoder.extract_poster(input, &output, offset).await?;
            let bytes = tokio::fs::read(&output).await?;
            let key = artifact_key(video.id, None, "thumbnail.jpg");
            self.gateway
                .publish(Bytes::from(bytes), &key, "image/jpeg")
                .await?;
            Ok::<String, anyhow::Error>(key)
        }
        .await;
        match result {
            Ok(key) => video.thumbnail_key = Some(key),
            Err(e) => {
                // Variants matter more than the poster; keep going.
                tracing::warn!(error = %format!("{e:#}"), "Thumbnail generation failed");
                video
                    .processing_errors
                    .push(format!("thumbnail: {e:#}"));
            }
        }
    }

    async fn preview_stage(
        &self,
        video: &mut Video,
        job: &ProcessingJob,
        input: &PathBuf,
        work_dir: &PathBuf,
        metadata: &SourceMetadata,
    ) {
        if !job.settings.generate_preview || video.preview_key.is_some() {
            return;
        }
        let duration = self.config.preview_duration_secs.min(metadata.duration);
        let output = work_dir.join("preview.mp4");
        let result = async {
            self.transcoder
                .extract_preview(input, &output, duration)
                .await?;
            let bytes = tokio::fs::read(&output).await?;
            let key = artifact_key(video.id, None, "preview.mp4");
            self.gateway
                .publish(Bytes::from(bytes), &key, "video/mp4")
                .await?;
            Ok::<String, anyhow::Error>(key)
        }
        .await;
        match result {
            Ok(key) => video.preview_key = Some(key),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Preview generation failed");
                video.processing_errors.push(format!("preview: {e:#}"));
            }
        }
    }

    /// Stage the watermark image to local disk. An unavailable watermark is
    /// recorded but does not fail the attempt.
    async fn stage_watermark(
        &self,
        video: &mut Video,
        job: &ProcessingJob,
        work_dir: &PathBuf,
    ) -> Option<WatermarkOverlay> {
        let spec = job.settings.watermark.as_ref()?;
        let staged = async {
            let bytes = self.gateway.fetch(&spec.image_key).await?;
            let path = work_dir.join("watermark_overlay");
            tokio::fs::write(&path, &bytes).await?;
            Ok::<PathBuf, anyhow::Error>(path)
        }
        .await;
        match staged {
            Ok(image_path) => Some(WatermarkOverlay {
                image_path,
                position: spec.position.clone(),
                opacity: spec.opacity,
            }),
            Err(e) => {
                tracing::warn!(key = %spec.image_key, error = %e, "Watermark unavailable, encoding without overlay");
                video.processing_errors.push(format!("watermark: {e}"));
                None
            }
        }
    }

    /// Run all pending variant encodes with bounded parallelism. Each variant
    /// outcome is persisted immediately so partial progress survives a crash.
    async fn transcode_stage(
        &self,
        video: Video,
        profiles: &[QualityProfile],
        input: &PathBuf,
        work_dir: &PathBuf,
        watermark: Option<WatermarkOverlay>,
    ) -> Video {
        let video_id = video.id;
        let shared = Arc::new(Mutex::new(video));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transcodes.max(1)));
        let mut encodes = JoinSet::new();

        for profile in profiles {
            {
                let guard = shared.lock().await;
                if let Some(variant) = guard.variant(&profile.label) {
                    if variant.status == VariantStatus::Completed {
                        tracing::info!(quality = %profile.label, "Variant already completed, skipping");
                        continue;
                    }
                }
            }

            let repo = self.repo.clone();
            let gateway = self.gateway.clone();
            let transcoder = self.transcoder.clone();
            let shared = shared.clone();
            let semaphore = semaphore.clone();
            let input = input.clone();
            let work_dir = work_dir.clone();
            let watermark = watermark.clone();
            let profile = profile.clone();

            encodes.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                {
                    let mut video = shared.lock().await;
                    if let Some(variant) = video.variant_mut(&profile.label) {
                        variant.status = VariantStatus::Processing;
                        variant.updated_at = chrono::Utc::now();
                    }
                    save_if_present(&repo, &video).await;
                }

                let output = work_dir.join(format!("{}.mp4", profile.label));
                let outcome = encode_and_publish(
                    &*transcoder,
                    &gateway,
                    video_id,
                    &profile,
                    &input,
                    &output,
                    watermark.as_ref(),
                )
                .await;

                let mut video = shared.lock().await;
                if let Some(variant) = video.variant_mut(&profile.label) {
                    match outcome {
                        Ok((key, size)) => {
                            tracing::info!(quality = %profile.label, key = %key, "Variant completed");
                            variant.status = VariantStatus::Completed;
                            variant.storage_key = Some(key);
                            variant.file_size = Some(size);
                            variant.error = None;
                        }
                        Err(e) => {
                            tracing::warn!(quality = %profile.label, error = %e, "Variant failed");
                            variant.status = VariantStatus::Failed;
                            variant.error = Some(e);
                        }
                    }
                    variant.updated_at = chrono::Utc::now();
                }
                save_if_present(&repo, &video).await;
            });
        }

        while let Some(joined) = encodes.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Variant encode task panicked");
            }
        }

        let video = shared.lock().await.clone();
        video
    }

    async fn manifest_stage(
        &self,
        video: &mut Video,
        job: &ProcessingJob,
        metadata: &SourceMetadata,
    ) -> Result<(), JobError> {
        if !job.settings.adaptive_streaming || video.completed_variants().is_empty() {
            return Ok(());
        }

        let (hls, dash) = {
            let completed = video.completed_variants();
            (
                build_hls_master(&completed),
                build_dash_mpd(&completed, metadata.duration),
            )
        };

        let hls_key = artifact_key(video.id, None, "master.m3u8");
        self.gateway
            .publish(Bytes::from(hls), &hls_key, "application/vnd.apple.mpegurl")
            .await
            .map_err(JobError::recoverable)?;
        video.hls_manifest_key = Some(hls_key);

        let dash_key = artifact_key(video.id, None, "manifest.mpd");
        self.gateway
            .publish(Bytes::from(dash), &dash_key, "application/dash+xml")
            .await
            .map_err(JobError::recoverable)?;
        video.dash_manifest_key = Some(dash_key);

        save_if_present(&self.repo, video).await;
        Ok(())
    }
}

async fn encode_and_publish(
    transcoder: &dyn Transcoder,
    gateway: &CdnGateway,
    video_id: Uuid,
    profile: &QualityProfile,
    input: &PathBuf,
    output: &PathBuf,
    watermark: Option<&WatermarkOverlay>,
) -> Result<(String, u64), String> {
    transcoder
        .transcode(input, output, profile, watermark)
        .await
        .map_err(|e| format!("{e:#}"))?;
    let bytes = tokio::fs::read(output)
        .await
        .map_err(|e| format!("read of encoded output failed: {e}"))?;
    let key = artifact_key(video_id, Some(&profile.label), &format!("{}.mp4", profile.label));
    let artifact = gateway
        .publish(Bytes::from(bytes), &key, "video/mp4")
        .await
        .map_err(|e| format!("publish failed: {e}"))?;
    Ok((key, artifact.size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use vidra_core::models::{ProcessingSettings, Visibility};
    use vidra_core::{InMemoryVideoRepository, NoopEventSink};
    use vidra_storage::{HmacUrlSigner, InMemoryObjectStore, ObjectStore, UrlSigner};

    struct FakeProbe;

    #[async_trait]
    impl MediaProbe for FakeProbe {
        async fn probe(&self, _path: &Path) -> Result<SourceMetadata, JobError> {
            Ok(SourceMetadata {
                duration: 120.0,
                width: 1920,
                height: 1080,
                frame_rate: 30.0,
                bitrate: Some(4_000_000),
                video_codec: "h264".into(),
                audio_codec: Some("aac".into()),
                file_size: 1024,
            })
        }
    }

    struct FakeTranscoder {
        failing: Vec<String>,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            profile: &QualityProfile,
            _watermark: Option<&WatermarkOverlay>,
        ) -> anyhow::Result<()> {
            if self.failing.contains(&profile.label) {
                anyhow::bail!("encoder crash on {}", profile.label);
            }
            tokio::fs::write(output, profile.label.as_bytes()).await?;
            Ok(())
        }

        async fn extract_poster(
            &self,
            _input: &Path,
            output: &Path,
            _offset_secs: f64,
        ) -> anyhow::Result<()> {
            tokio::fs::write(output, b"jpeg").await?;
            Ok(())
        }

        async fn extract_preview(
            &self,
            _input: &Path,
            output: &Path,
            _duration_secs: f64,
        ) -> anyhow::Result<()> {
            tokio::fs::write(output, b"clip").await?;
            Ok(())
        }
    }

    struct Harness {
        repo: Arc<InMemoryVideoRepository>,
        store: Arc<InMemoryObjectStore>,
        pipeline: ProcessingPipeline,
    }

    fn harness(failing: Vec<String>) -> Harness {
        let repo = InMemoryVideoRepository::new();
        let store = Arc::new(InMemoryObjectStore::new());
        let gateway = Arc::new(CdnGateway::new(
            store.clone(),
            "cdn.vidra.local".into(),
            UrlSigner::Hmac(HmacUrlSigner::new("secret".into())),
        ));
        let pipeline = ProcessingPipeline::new(
            repo.clone(),
            gateway,
            Arc::new(FakeProbe),
            Arc::new(FakeTranscoder { failing }),
            Arc::new(NoopEventSink),
            PipelineConfig::default(),
        );
        Harness {
            repo,
            store,
            pipeline,
        }
    }

    async fn seeded_video(harness: &Harness, settings: ProcessingSettings) -> ProcessingJob {
        let mut video = Video::new("lecture".into(), Visibility::Public, Uuid::new_v4());
        video.processing = settings.clone();
        let source_key = artifact_key(video.id, None, "source.mp4");
        video.origin_key = Some(source_key.clone());
        harness
            .store
            .put(&source_key, Bytes::from_static(b"raw"), "video/mp4")
            .await
            .unwrap();
        harness.repo.save(&video).await.unwrap();
        ProcessingJob::new(video.id, source_key, settings, 3)
    }

    fn two_level_settings() -> ProcessingSettings {
        ProcessingSettings {
            quality_levels: vec!["360p".into(), "480p".into()],
            ..ProcessingSettings::default()
        }
    }

    #[tokio::test]
    async fn full_run_reaches_ready_with_all_artifacts() {
        let h = harness(vec![]);
        let job = seeded_video(&h, two_level_settings()).await;

        h.pipeline.run(&job).await.unwrap();

        let video = h.repo.get(job.video_id).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.completed_variants().len(), 2);
        assert!(video.metadata.is_some());
        assert!(video.thumbnail_key.is_some());
        assert!(video.preview_key.is_some());
        assert!(video.hls_manifest_key.is_some());
        assert!(video.dash_manifest_key.is_some());

        let hls = h
            .store
            .get(video.hls_manifest_key.as_deref().unwrap())
            .await
            .unwrap();
        let hls = String::from_utf8(hls.to_vec()).unwrap();
        assert!(hls.contains("360p/360p.mp4"));
        assert!(hls.contains("480p/480p.mp4"));
    }

    #[tokio::test]
    async fn partial_success_still_reaches_ready() {
        let h = harness(vec!["480p".into()]);
        let job = seeded_video(&h, two_level_settings()).await;

        h.pipeline.run(&job).await.unwrap();

        let video = h.repo.get(job.video_id).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.completed_variants().len(), 1);
        let failed = video.variant("480p").unwrap();
        assert_eq!(failed.status, VariantStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("encoder crash"));

        // Manifest only lists the completed rendition.
        let hls = h
            .store
            .get(video.hls_manifest_key.as_deref().unwrap())
            .await
            .unwrap();
        let hls = String::from_utf8(hls.to_vec()).unwrap();
        assert!(hls.contains("360p/360p.mp4"));
        assert!(!hls.contains("480p/480p.mp4"));
    }

    #[tokio::test]
    async fn all_variants_failing_marks_video_failed_and_retries() {
        let h = harness(vec!["360p".into(), "480p".into()]);
        let job = seeded_video(&h, two_level_settings()).await;

        let err = h.pipeline.run(&job).await.unwrap_err();
        assert!(err.is_recoverable());

        let video = h.repo.get(job.video_id).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert!(!video.processing_errors.is_empty());
    }

    #[tokio::test]
    async fn min_completed_variants_is_enforced() {
        let h = harness(vec!["480p".into()]);
        let settings = ProcessingSettings {
            min_completed_variants: 2,
            ..two_level_settings()
        };
        let job = seeded_video(&h, settings).await;

        let err = h.pipeline.run(&job).await.unwrap_err();
        assert!(err.is_recoverable());
        let video = h.repo.get(job.video_id).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
    }

    #[tokio::test]
    async fn deleted_video_aborts_without_artifacts() {
        let h = harness(vec![]);
        let job = seeded_video(&h, two_level_settings()).await;
        h.repo.delete(job.video_id).await.unwrap();
        let objects_before = h.store.len().await;

        h.pipeline.run(&job).await.unwrap();

        assert_eq!(h.store.len().await, objects_before);
    }

    #[tokio::test]
    async fn rerun_after_success_is_a_noop() {
        let h = harness(vec![]);
        let job = seeded_video(&h, two_level_settings()).await;

        h.pipeline.run(&job).await.unwrap();
        let first = h.repo.get(job.video_id).await.unwrap().unwrap();

        h.pipeline.run(&job).await.unwrap();
        let second = h.repo.get(job.video_id).await.unwrap().unwrap();
        assert_eq!(second.status, VideoStatus::Ready);
        assert_eq!(second.variants.len(), first.variants.len());
    }

    #[tokio::test]
    async fn missing_source_is_unrecoverable() {
        let h = harness(vec![]);
        let mut video = Video::new("t".into(), Visibility::Public, Uuid::new_v4());
        video.processing = two_level_settings();
        h.repo.save(&video).await.unwrap();
        let job = ProcessingJob::new(
            video.id,
            artifact_key(video.id, None, "source.mp4"),
            two_level_settings(),
            3,
        );

        let err = h.pipeline.run(&job).await.unwrap_err();
        assert!(!err.is_recoverable());
        let video = h.repo.get(job.video_id).await.unwrap().unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
    }
}
