/// Disk-based blob storage backend
use crate::{
    blob_store::{BlobBackend, BlobStream},
    error::{StorageError, StorageResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::{fs, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;

/// Disk storage backend
///
/// Stores blobs on the local filesystem with directory sharding
/// based on key prefixes to prevent too many files in one directory.
#[derive(Clone)]
pub struct DiskBlobBackend {
    base_path: PathBuf,
}

impl DiskBlobBackend {
    /// Create a new disk storage backend
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the file path for a key
    ///
    /// Uses directory sharding on the last path segment: {base}/{first2chars}/{segment}
    /// For example, key "content/4f9a..." -> {base}/4f/4f9a...
    fn get_blob_path(&self, key: &str) -> PathBuf {
        let name = key.rsplit('/').next().unwrap_or(key);
        if name.len() >= 2 && name.is_char_boundary(2) {
            self.base_path.join(&name[0..2]).join(name)
        } else {
            self.base_path.join("_").join(name)
        }
    }

    /// Ensure the directory for a blob exists
    async fn ensure_blob_dir(&self, key: &str) -> StorageResult<PathBuf> {
        let blob_path = self.get_blob_path(key);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::StorageWrite(format!("Failed to create blob directory: {}", e))
            })?;
        }
        Ok(blob_path)
    }
}

#[async_trait]
impl BlobBackend for DiskBlobBackend {
    async fn put(&self, key: &str, _content_type: &str, data: Bytes) -> StorageResult<()> {
        let blob_path = self.ensure_blob_dir(key).await?;
        let tmp_path = blob_path.with_extension("partial");

        let write = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &blob_path).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::StorageWrite(format!(
                "Failed to write blob {}: {}",
                key, e
            )));
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<BlobStream> {
        let blob_path = self.get_blob_path(key);

        match fs::File::open(&blob_path).await {
            Ok(file) => Ok(Box::pin(ReaderStream::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::StorageRead(
                format!("Blob {} is missing from disk storage", key),
            )),
            Err(e) => Err(StorageError::StorageRead(format!(
                "Failed to read blob {}: {}",
                key, e
            ))),
        }
    }

    async fn ping(&self) -> StorageResult<()> {
        fs::metadata(&self.base_path).await.map_err(|e| {
            StorageError::StorageRead(format!("Blob directory unavailable: {}", e))
        })?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}
