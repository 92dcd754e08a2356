//! Video repository abstraction
//!
//! The pipeline and the access control engine are storage-agnostic: they talk
//! to a [`VideoRepository`] trait. The in-memory implementation backs tests
//! and single-node deployments; a database-backed implementation plugs in at
//! the same seam.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Video;

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Video>, AppError>;

    /// Insert or overwrite the full video record. State writes are
    /// immediately visible to subsequent reads.
    async fn save(&self, video: &Video) -> Result<(), AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    async fn list(&self) -> Result<Vec<Video>, AppError>;
}

/// In-memory repository keyed by video id.
#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<Uuid, Video>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Video>, AppError> {
        Ok(self.videos.read().await.get(&id).cloned())
    }

    async fn save(&self, video: &Video) -> Result<(), AppError> {
        self.videos.write().await.insert(video.id, video.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.videos.write().await.remove(&id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Video>, AppError> {
        Ok(self.videos.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;

    #[tokio::test]
    async fn save_get_delete_roundtrip() {
        let repo = InMemoryVideoRepository::new();
        let video = Video::new("t".into(), Visibility::Public, Uuid::new_v4());
        let id = video.id;

        repo.save(&video).await.unwrap();
        assert!(repo.get(id).await.unwrap().is_some());

        repo.delete(id).await.unwrap();
        assert!(repo.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_existing_record() {
        let repo = InMemoryVideoRepository::new();
        let mut video = Video::new("before".into(), Visibility::Public, Uuid::new_v4());
        repo.save(&video).await.unwrap();

        video.title = "after".into();
        repo.save(&video).await.unwrap();

        let stored = repo.get(video.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "after");
    }
}
