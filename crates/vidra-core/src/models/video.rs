use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::variant::{QualityVariant, VariantStatus};

/// Lifecycle status of a video record. Transitions are governed by the
/// state machine in [`crate::state`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoStatus {
    Uploading,
    Processing,
    Ready,
    Failed,
    Archived,
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoStatus::Uploading => write!(f, "UPLOADING"),
            VideoStatus::Processing => write!(f, "PROCESSING"),
            VideoStatus::Ready => write!(f, "READY"),
            VideoStatus::Failed => write!(f, "FAILED"),
            VideoStatus::Archived => write!(f, "ARCHIVED"),
        }
    }
}

/// Access class governing who may request delivery of a video.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Public,
    Private,
    Unlisted,
    CourseOnly,
}

/// Technical properties probed from the uploaded source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bitrate: Option<u64>,
    pub video_codec: String,
    pub audio_codec: Option<String>,
    pub file_size: u64,
}

/// Per-video delivery security settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub require_auth: bool,
    pub allowed_domains: Vec<String>,
    pub geo_allow: Vec<String>,
    pub geo_block: Vec<String>,
    pub drm_enabled: bool,
    pub drm_provider: Option<String>,
    /// Lifetime of issued signed URLs and access tokens, in seconds.
    pub signed_url_expiry_secs: u64,
    pub allow_download: bool,
    pub allow_embed: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            require_auth: false,
            allowed_domains: Vec::new(),
            geo_allow: Vec::new(),
            geo_block: Vec::new(),
            drm_enabled: false,
            drm_provider: None,
            signed_url_expiry_secs: 3600,
            allow_download: false,
            allow_embed: true,
        }
    }
}

/// Watermark overlay descriptor applied during transcoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub image_key: String,
    /// ffmpeg overlay position expression, e.g. "W-w-10:H-h-10".
    pub position: String,
    pub opacity: f32,
}

/// Processing settings snapshotted into the job at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Requested quality labels, e.g. ["480p", "720p"].
    pub quality_levels: Vec<String>,
    pub adaptive_streaming: bool,
    pub generate_thumbnail: bool,
    pub generate_preview: bool,
    pub watermark: Option<WatermarkSpec>,
    /// Minimum completed variants required to reach READY.
    pub min_completed_variants: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            quality_levels: vec!["360p".into(), "480p".into(), "720p".into(), "1080p".into()],
            adaptive_streaming: true,
            generate_thumbnail: true,
            generate_preview: true,
            watermark: None,
            min_completed_variants: 1,
        }
    }
}

/// A video record. Exclusively owns its quality variants; the processing job
/// references it by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: VideoStatus,
    pub visibility: Visibility,
    /// Course association, required for COURSE_ONLY visibility.
    pub course_id: Option<Uuid>,
    pub uploader_id: Uuid,
    pub metadata: Option<SourceMetadata>,
    pub security: SecuritySettings,
    pub processing: ProcessingSettings,
    /// Ordered set of variants owned by this video.
    pub variants: Vec<QualityVariant>,
    /// Storage key of the canonical source artifact.
    pub origin_key: Option<String>,
    pub hls_manifest_key: Option<String>,
    pub dash_manifest_key: Option<String>,
    pub thumbnail_key: Option<String>,
    pub preview_key: Option<String>,
    /// Processing attempts consumed so far.
    pub attempts: u32,
    /// Errors accumulated across processing stages, surfaced on FAILED.
    pub processing_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn new(title: String, visibility: Visibility, uploader_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description: None,
            status: VideoStatus::Uploading,
            visibility,
            course_id: None,
            uploader_id,
            metadata: None,
            security: SecuritySettings::default(),
            processing: ProcessingSettings::default(),
            variants: Vec::new(),
            origin_key: None,
            hls_manifest_key: None,
            dash_manifest_key: None,
            thumbnail_key: None,
            preview_key: None,
            attempts: 0,
            processing_errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up an owned variant by quality label.
    pub fn variant(&self, quality: &str) -> Option<&QualityVariant> {
        self.variants.iter().find(|v| v.quality == quality)
    }

    pub fn variant_mut(&mut self, quality: &str) -> Option<&mut QualityVariant> {
        self.variants.iter_mut().find(|v| v.quality == quality)
    }

    /// Variants that finished transcoding, in insertion order.
    pub fn completed_variants(&self) -> Vec<&QualityVariant> {
        self.variants
            .iter()
            .filter(|v| v.status == VariantStatus::Completed)
            .collect()
    }

    /// All storage keys published for this video, used for cascade deletion.
    pub fn artifact_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(k) = &self.origin_key {
            keys.push(k.clone());
        }
        for variant in &self.variants {
            if let Some(k) = &variant.storage_key {
                keys.push(k.clone());
            }
        }
        for k in [
            &self.hls_manifest_key,
            &self.dash_manifest_key,
            &self.thumbnail_key,
            &self.preview_key,
        ]
        .into_iter()
        .flatten()
        {
            keys.push(k.clone());
        }
        keys
    }
}
