use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::video::ProcessingSettings;

/// A processing job for one video. Created when the source upload completes,
/// mutated only by the orchestrator, and removed on a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub video_id: Uuid,
    /// Storage key of the canonical source artifact.
    pub source_key: String,
    /// Settings snapshot taken at enqueue time.
    pub settings: ProcessingSettings,
    pub attempts: u32,
    pub max_attempts: u32,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(
        video_id: Uuid,
        source_key: String,
        settings: ProcessingSettings,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_id,
            source_key,
            settings,
            attempts: 0,
            max_attempts,
            errors: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether another attempt may be scheduled after a transient failure.
    pub fn can_retry(&self) -> bool {
        self.attempts + 1 < self.max_attempts
    }
}
