/// In-memory blob storage backend for development and tests
use crate::{
    blob_store::{BlobBackend, BlobStream},
    error::{StorageError, StorageResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A stored object with the content type it was written with
#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub content_type: String,
    pub data: Bytes,
}

/// Memory storage backend
///
/// Clones share the same object map.
#[derive(Clone, Default)]
pub struct MemoryBlobBackend {
    objects: Arc<RwLock<HashMap<String, MemoryObject>>>,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Look up an object without streaming it
    pub async fn object(&self, key: &str) -> Option<MemoryObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// Drop an object, simulating an orphaned metadata row
    pub async fn remove(&self, key: &str) -> Option<MemoryObject> {
        self.objects.write().await.remove(key)
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobBackend {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<()> {
        self.objects.write().await.insert(
            key.to_string(),
            MemoryObject {
                content_type: content_type.to_string(),
                // Own copy, the caller's buffer goes back to its pool
                data: Bytes::copy_from_slice(&data),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<BlobStream> {
        let object = self
            .object(key)
            .await
            .ok_or_else(|| StorageError::StorageRead(format!("Blob {} not in memory store", key)))?;

        Ok(Box::pin(futures::stream::once(async move {
            Ok::<_, std::io::Error>(object.data)
        })))
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
