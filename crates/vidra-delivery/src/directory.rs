//! Directory traits consulted by the access control engine.
//!
//! Account status and course enrollment live in other systems; the engine
//! talks to them through these seams. The in-memory implementation backs
//! tests and single-node deployments.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use vidra_core::AppError;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether the account exists and is in good standing.
    async fn is_active(&self, user_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait EnrollmentChecker: Send + Sync {
    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> Result<bool, AppError>;
}

/// In-memory directory covering both traits.
#[derive(Default)]
pub struct InMemoryDirectory {
    active_users: RwLock<HashSet<Uuid>>,
    enrollments: RwLock<HashSet<(Uuid, Uuid)>>,
}

impl InMemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_active_user(&self, user_id: Uuid) {
        self.active_users.write().await.insert(user_id);
    }

    pub async fn suspend_user(&self, user_id: Uuid) {
        self.active_users.write().await.remove(&user_id);
    }

    pub async fn enroll(&self, user_id: Uuid, course_id: Uuid) {
        self.enrollments.write().await.insert((user_id, course_id));
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn is_active(&self, user_id: Uuid) -> Result<bool, AppError> {
        Ok(self.active_users.read().await.contains(&user_id))
    }
}

#[async_trait]
impl EnrollmentChecker for InMemoryDirectory {
    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> Result<bool, AppError> {
        Ok(self.enrollments.read().await.contains(&(user_id, course_id)))
    }
}
