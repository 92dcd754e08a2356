use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::video::{ProcessingSettings, SecuritySettings, Visibility};

/// Request payload for registering a new video.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVideoRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub visibility: Visibility,
    pub course_id: Option<Uuid>,
    pub security: Option<SecuritySettings>,
    pub processing: Option<ProcessingSettings>,
}

/// Where the client should upload the source file for a newly created video.
#[derive(Debug, Clone, Serialize)]
pub struct UploadDestination {
    pub video_id: Uuid,
    pub storage_key: String,
}
