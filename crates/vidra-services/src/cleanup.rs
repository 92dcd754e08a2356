//! Orphaned artifact tracking and reconciliation.
//!
//! Cascade deletion is best-effort: when an origin delete fails, the key is
//! recorded here instead of failing the whole operation, and a periodic
//! reconciliation pass retries the deletes. Keys that are already gone count
//! as reconciled.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use vidra_core::AppError;
use vidra_storage::{CdnGateway, StorageError};

/// Keys whose deletion failed and still needs to happen.
#[derive(Default)]
pub struct OrphanRegistry {
    keys: Mutex<HashSet<String>>,
}

impl OrphanRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn record(&self, key: String) {
        tracing::warn!(key = %key, "Recording orphaned artifact for later cleanup");
        self.keys.lock().await.insert(key);
    }

    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.lock().await.is_empty()
    }

    async fn take_all(&self) -> Vec<String> {
        self.keys.lock().await.drain().collect()
    }

    async fn put_back(&self, key: String) {
        self.keys.lock().await.insert(key);
    }
}

/// Retries deletion of orphaned artifacts.
pub struct CleanupService {
    gateway: Arc<CdnGateway>,
    registry: Arc<OrphanRegistry>,
}

impl CleanupService {
    pub fn new(gateway: Arc<CdnGateway>, registry: Arc<OrphanRegistry>) -> Self {
        Self { gateway, registry }
    }

    /// One reconciliation pass. Returns how many keys were cleaned up;
    /// keys that still fail stay registered for the next pass.
    pub async fn reconcile(&self) -> Result<usize, AppError> {
        let pending = self.registry.take_all().await;
        if pending.is_empty() {
            return Ok(0);
        }
        tracing::info!(pending = pending.len(), "Reconciling orphaned artifacts");

        let mut cleaned = 0;
        for key in pending {
            match self.gateway.delete(&key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => cleaned += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Orphan cleanup failed, will retry");
                    self.registry.put_back(key).await;
                }
            }
        }
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use vidra_storage::{HmacUrlSigner, InMemoryObjectStore, ObjectStore, UrlSigner};

    fn gateway(store: Arc<InMemoryObjectStore>) -> Arc<CdnGateway> {
        Arc::new(CdnGateway::new(
            store,
            "cdn.vidra.local".into(),
            UrlSigner::Hmac(HmacUrlSigner::new("secret".into())),
        ))
    }

    #[tokio::test]
    async fn reconcile_deletes_recorded_keys() {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .put("videos/x/leftover.mp4", Bytes::from_static(b"a"), "video/mp4")
            .await
            .unwrap();
        let registry = OrphanRegistry::new();
        registry.record("videos/x/leftover.mp4".into()).await;

        let cleanup = CleanupService::new(gateway(store.clone()), registry.clone());
        assert_eq!(cleanup.reconcile().await.unwrap(), 1);
        assert!(registry.is_empty().await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn already_gone_keys_count_as_reconciled() {
        let store = Arc::new(InMemoryObjectStore::new());
        let registry = OrphanRegistry::new();
        registry.record("videos/x/never-existed".into()).await;

        let cleanup = CleanupService::new(gateway(store), registry.clone());
        assert_eq!(cleanup.reconcile().await.unwrap(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn empty_registry_is_a_noop() {
        let store = Arc::new(InMemoryObjectStore::new());
        let cleanup = CleanupService::new(gateway(store), OrphanRegistry::new());
        assert_eq!(cleanup.reconcile().await.unwrap(), 0);
    }
}
