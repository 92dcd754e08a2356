//! Video service: intake, playback info, deletion, archival.
//!
//! The service owns the operation boundaries: request validation, ownership
//! checks, signed-URL issuance, and the cascade on deletion. Processing
//! itself happens asynchronously; `upload_source` only publishes the source
//! artifact and enqueues the job.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use vidra_core::models::{
    AccessToken, CreateVideoRequest, ProcessingJob, UploadDestination, Video, VideoStatus,
    Visibility,
};
use vidra_core::{state, AppError, EventSink, VideoEvent, VideoRepository};
use vidra_delivery::{AccessContext, AccessControlEngine, AccessDecision, DrmConfig, DrmProvider};
use vidra_storage::{artifact_key, CdnGateway, SignedUrlOptions, StorageError};
use vidra_worker::JobQueue;

use crate::cleanup::OrphanRegistry;

/// Direct playback URL for one completed rendition.
#[derive(Debug, Clone)]
pub struct VariantUrl {
    pub quality: String,
    pub resolution: String,
    pub bitrate_kbps: u32,
    pub url: String,
}

/// Everything a player needs to start playback of one video.
#[derive(Debug, Clone)]
pub struct StreamingInfo {
    pub video_id: Uuid,
    pub hls_url: Option<String>,
    pub dash_url: Option<String>,
    /// Signed per-quality URLs for players that do not speak HLS/DASH.
    pub variants: Vec<VariantUrl>,
    pub thumbnail_url: Option<String>,
    pub preview_url: Option<String>,
    pub token: AccessToken,
    pub drm: Option<DrmConfig>,
    /// Correlates playback events reported by the player.
    pub analytics_session_id: Uuid,
}

pub struct VideoService {
    repo: Arc<dyn VideoRepository>,
    gateway: Arc<CdnGateway>,
    queue: Arc<dyn JobQueue>,
    access: Arc<AccessControlEngine>,
    drm: Arc<DrmProvider>,
    events: Arc<dyn EventSink>,
    orphans: Arc<OrphanRegistry>,
    job_max_attempts: u32,
}

impl VideoService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn VideoRepository>,
        gateway: Arc<CdnGateway>,
        queue: Arc<dyn JobQueue>,
        access: Arc<AccessControlEngine>,
        drm: Arc<DrmProvider>,
        events: Arc<dyn EventSink>,
        orphans: Arc<OrphanRegistry>,
        job_max_attempts: u32,
    ) -> Self {
        Self {
            repo,
            gateway,
            queue,
            access,
            drm,
            events,
            orphans,
            job_max_attempts,
        }
    }

    /// Register a new video for `uploader_id` and hand back the upload
    /// destination for its source file.
    pub async fn create_video(
        &self,
        req: CreateVideoRequest,
        uploader_id: Uuid,
    ) -> Result<UploadDestination, AppError> {
        req.validate()?;
        if req.visibility == Visibility::CourseOnly && req.course_id.is_none() {
            return Err(AppError::Validation(
                "COURSE_ONLY visibility requires a course id".into(),
            ));
        }

        let mut video = Video::new(req.title, req.visibility, uploader_id);
        video.description = req.description;
        video.course_id = req.course_id;
        if let Some(security) = req.security {
            video.security = security;
        }
        if let Some(processing) = req.processing {
            video.processing = processing;
        }

        let storage_key = artifact_key(video.id, None, "source.mp4");
        video.origin_key = Some(storage_key.clone());
        self.repo.save(&video).await?;

        tracing::info!(video_id = %video.id, key = %storage_key, "Video registered");
        Ok(UploadDestination {
            video_id: video.id,
            storage_key,
        })
    }

    /// Accept the uploaded source bytes, publish them to the origin store,
    /// and enqueue the processing job. Returns the job id.
    pub async fn upload_source(
        &self,
        video_id: Uuid,
        data: Bytes,
        content_type: &str,
    ) -> Result<Uuid, AppError> {
        let mut video = self.get_video(video_id).await?;
        if video.status != VideoStatus::Uploading {
            return Err(AppError::Validation(format!(
                "video is {} and no longer accepts a source upload",
                video.status
            )));
        }
        if data.is_empty() {
            return Err(AppError::Validation("uploaded file is empty".into()));
        }

        let storage_key = video
            .origin_key
            .clone()
            .unwrap_or_else(|| artifact_key(video.id, None, "source.mp4"));
        let artifact = self.gateway.publish(data, &storage_key, content_type).await?;
        video.origin_key = Some(storage_key.clone());
        self.repo.save(&video).await?;

        let job = ProcessingJob::new(
            video.id,
            storage_key,
            video.processing.clone(),
            self.job_max_attempts,
        );
        let job_id = self
            .queue
            .enqueue(job)
            .await
            .map_err(|e| AppError::Internal(format!("failed to enqueue processing job: {e}")))?;

        tracing::info!(
            video_id = %video.id,
            job_id = %job_id,
            size_bytes = artifact.size,
            "Source uploaded and processing enqueued"
        );
        Ok(job_id)
    }

    pub async fn get_video(&self, video_id: Uuid) -> Result<Video, AppError> {
        self.repo
            .get(video_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("video {video_id}")))
    }

    /// Evaluate access and assemble playback information: signed manifest
    /// URLs, the access token, and DRM configuration when enabled.
    pub async fn get_streaming_info(
        &self,
        video_id: Uuid,
        ctx: &AccessContext,
    ) -> Result<StreamingInfo, AppError> {
        let video = self.get_video(video_id).await?;

        let token = match self.access.evaluate(&video, ctx).await? {
            AccessDecision::Granted { token } => token,
            AccessDecision::Denied { reason } => return Err(AppError::Authorization(reason)),
        };

        let opts = SignedUrlOptions {
            expires_in: Duration::from_secs(video.security.signed_url_expiry_secs),
            ip: ctx.ip.clone(),
        };
        let hls_url = self.sign_optional(video.hls_manifest_key.as_deref(), &opts)?;
        let dash_url = self.sign_optional(video.dash_manifest_key.as_deref(), &opts)?;
        let thumbnail_url = self.sign_optional(video.thumbnail_key.as_deref(), &opts)?;
        let preview_url = self.sign_optional(video.preview_key.as_deref(), &opts)?;

        let mut variants = Vec::new();
        for variant in video.completed_variants() {
            let Some(key) = variant.storage_key.as_deref() else {
                continue;
            };
            variants.push(VariantUrl {
                quality: variant.quality.clone(),
                resolution: variant.resolution(),
                bitrate_kbps: variant.bitrate_kbps,
                url: self.gateway.sign_url(key, &opts)?,
            });
        }

        let drm = self.drm.config_for(&video)?;

        Ok(StreamingInfo {
            video_id: video.id,
            hls_url,
            dash_url,
            variants,
            thumbnail_url,
            preview_url,
            token,
            drm,
            analytics_session_id: Uuid::new_v4(),
        })
    }

    fn sign_optional(
        &self,
        key: Option<&str>,
        opts: &SignedUrlOptions,
    ) -> Result<Option<String>, AppError> {
        key.map(|k| self.gateway.sign_url(k, opts))
            .transpose()
            .map_err(AppError::from)
    }

    /// Delete a video: cancel queued work, remove published artifacts, and
    /// drop the record. Artifact deletion is best-effort; failures land in
    /// the orphan registry for later reconciliation.
    pub async fn delete_video(&self, video_id: Uuid, requester: Uuid) -> Result<(), AppError> {
        let video = self.get_video(video_id).await?;
        if video.uploader_id != requester {
            return Err(AppError::Authorization(
                "only the uploader may delete this video".into(),
            ));
        }

        if let Err(e) = self.queue.cancel_video(video_id).await {
            tracing::warn!(video_id = %video_id, error = %e, "Queue cancellation failed");
        }

        for key in video.artifact_keys() {
            match self.gateway.delete(&key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Artifact delete failed");
                    self.orphans.record(key).await;
                }
            }
        }

        self.repo.delete(video_id).await?;
        self.events
            .record(VideoEvent::VideoDeleted { video_id })
            .await;
        tracing::info!(video_id = %video_id, "Video deleted");
        Ok(())
    }

    /// Archive a READY video, removing it from delivery without deleting
    /// artifacts.
    pub async fn archive_video(&self, video_id: Uuid, requester: Uuid) -> Result<Video, AppError> {
        let mut video = self.get_video(video_id).await?;
        if video.uploader_id != requester {
            return Err(AppError::Authorization(
                "only the uploader may archive this video".into(),
            ));
        }
        state::transition(&mut video, VideoStatus::Archived, self.job_max_attempts)
            .map_err(|e| AppError::Validation(e.to_string()))?;
        self.repo.save(&video).await?;
        Ok(video)
    }
}
