use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

/// Sub-lifecycle of a single quality variant, independent from the parent
/// video's status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Display for VariantStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VariantStatus::Pending => write!(f, "pending"),
            VariantStatus::Processing => write!(f, "processing"),
            VariantStatus::Completed => write!(f, "completed"),
            VariantStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One independently encoded rendition of a video. Owned by exactly one
/// video; carries only the parent id, never a live back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityVariant {
    pub video_id: Uuid,
    pub quality: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub codec: String,
    pub container: String,
    pub storage_key: Option<String>,
    pub status: VariantStatus,
    pub error: Option<String>,
    pub file_size: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

impl QualityVariant {
    pub fn new(video_id: Uuid, quality: &str, width: u32, height: u32, bitrate_kbps: u32) -> Self {
        Self {
            video_id,
            quality: quality.to_string(),
            width,
            height,
            bitrate_kbps,
            codec: "h264".to_string(),
            container: "mp4".to_string(),
            storage_key: None,
            status: VariantStatus::Pending,
            error: None,
            file_size: None,
            updated_at: Utc::now(),
        }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_variant_is_pending() {
        let variant = QualityVariant::new(Uuid::new_v4(), "480p", 854, 480, 1400);
        assert_eq!(variant.status, VariantStatus::Pending);
        assert_eq!(variant.resolution(), "854x480");
        assert!(variant.storage_key.is_none());
    }

    #[test]
    fn variant_status_serializes_lowercase() {
        let json = serde_json::to_string(&VariantStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
