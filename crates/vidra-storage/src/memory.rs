//! In-memory object store, used by tests and single-process setups.

use crate::traits::{ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    base_url: String,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: "http://origin.test".to_string(),
        }
    }

    /// Number of stored objects; test helper.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(data, _)| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_and_delete_removes() {
        let store = InMemoryObjectStore::new();
        store
            .put("videos/x/source", Bytes::from_static(b"a"), "video/mp4")
            .await
            .unwrap();
        store
            .put("videos/x/source", Bytes::from_static(b"bb"), "video/mp4")
            .await
            .unwrap();
        assert_eq!(store.content_length("videos/x/source").await.unwrap(), 2);

        store.delete("videos/x/source").await.unwrap();
        assert!(store.is_empty().await);
    }
}
