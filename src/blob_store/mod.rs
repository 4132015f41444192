/// Blob Storage System
///
/// Holds the raw bytes of uploaded files under opaque keys.
/// Supports multiple backend implementations (disk, S3, memory).

pub mod disk;
pub mod memory;
pub mod s3;

pub use disk::DiskBlobBackend;
pub use memory::MemoryBlobBackend;
pub use s3::{S3BlobBackend, S3Config};

use crate::{
    config::BlobstoreConfig,
    error::StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Stream of bytes for blob content
pub type BlobStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Blob storage backend trait
///
/// Implementations handle the actual storage and retrieval of blob data.
/// A successful `put` means the object is durably accepted.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store an object under `key`
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<()>;

    /// Open an object for streaming. A missing object is a read error.
    async fn get(&self, key: &str) -> StorageResult<BlobStream>;

    /// Cheap reachability check used by the readiness endpoint
    async fn ping(&self) -> StorageResult<()>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Build the configured backend
pub async fn create_backend(config: &BlobstoreConfig) -> StorageResult<Arc<dyn BlobBackend>> {
    let backend: Arc<dyn BlobBackend> = match config {
        BlobstoreConfig::Disk { location } => {
            tokio::fs::create_dir_all(location).await?;
            Arc::new(DiskBlobBackend::new(location.clone()))
        }
        BlobstoreConfig::S3 {
            bucket,
            region,
            access_key_id,
            secret_access_key,
            endpoint,
            prefix,
        } => {
            let backend = S3BlobBackend::new(S3Config {
                bucket: bucket.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                prefix: prefix.clone(),
            })
            .await?;
            backend.ensure_bucket().await;
            Arc::new(backend)
        }
        BlobstoreConfig::Memory => Arc::new(MemoryBlobBackend::new()),
    };

    tracing::info!("Blob storage backend: {}", backend.backend_name());
    Ok(backend)
}
