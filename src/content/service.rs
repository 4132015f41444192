/// Content ingestion and retrieval pipelines
///
/// Uploads are processed one section at a time: the section body is
/// buffered, written to the blob store, and only then recorded in the
/// metadata repository. A failure stops the request; sections stored
/// before it stay stored.
use crate::{
    blob_store::BlobBackend,
    buffer_pool::BufferPool,
    config::IngestionConfig,
    content::{
        models::{generate_blob_key, ContentDownload, NewContent},
        repository::ContentRepository,
    },
    error::{StorageError, StorageResult},
    metrics,
    multipart::{FileSection, SectionDecoder},
};
use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Race a step against the request's cancellation token
async fn until_cancelled<T, F>(cancel: &CancellationToken, step: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = step => result,
    }
}

fn write_error(e: StorageError) -> StorageError {
    match e {
        StorageError::StorageWrite(_) | StorageError::Cancelled => e,
        other => StorageError::StorageWrite(other.to_string()),
    }
}

fn read_error(e: StorageError) -> StorageError {
    match e {
        StorageError::StorageRead(_) | StorageError::Cancelled => e,
        other => StorageError::StorageRead(other.to_string()),
    }
}

fn outcome<T>(result: &StorageResult<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    }
}

/// Stores uploaded files and serves them back by id
#[derive(Clone)]
pub struct ContentService {
    repository: Arc<dyn ContentRepository>,
    blobs: Arc<dyn BlobBackend>,
    pool: BufferPool,
    limits: IngestionConfig,
}

impl ContentService {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        blobs: Arc<dyn BlobBackend>,
        limits: IngestionConfig,
    ) -> Self {
        let pool = BufferPool::with_default_tiers(limits.pool_buffers_per_tier);
        Self {
            repository,
            blobs,
            pool,
            limits,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ContentRepository> {
        &self.repository
    }

    pub fn blobs(&self) -> &Arc<dyn BlobBackend> {
        &self.blobs
    }

    /// Store every file section of a multipart body
    ///
    /// Returns the new content ids in section order. Sections without a
    /// file name are skipped, so a body with no file sections yields an
    /// empty list.
    pub async fn create_content<S, O, E>(
        &self,
        body: S,
        boundary: String,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<i64>>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let mut decoder = SectionDecoder::new(body, boundary);
        let result = self.ingest_all(&mut decoder, cancel).await;
        metrics::record_upload(outcome(&result));
        result
    }

    async fn ingest_all(
        &self,
        decoder: &mut SectionDecoder,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<i64>> {
        let mut ids = Vec::new();

        while let Some(mut section) = until_cancelled(cancel, decoder.next_file_section()).await? {
            if ids.len() >= self.limits.max_sections {
                return Err(StorageError::PayloadTooLarge(format!(
                    "Upload exceeds maximum of {} file sections",
                    self.limits.max_sections
                )));
            }

            let id = self.ingest_section(&mut section, cancel).await.map_err(|e| {
                warn!(
                    "Section {} ('{}') failed after {} stored: {}",
                    section.position(),
                    section.file_name(),
                    ids.len(),
                    e
                );
                e
            })?;
            ids.push(id);
        }

        info!("Stored {} file section(s): {:?}", ids.len(), ids);
        Ok(ids)
    }

    async fn ingest_section(
        &self,
        section: &mut FileSection,
        cancel: &CancellationToken,
    ) -> StorageResult<i64> {
        let content = NewContent::new(
            section.file_name(),
            section.content_type(),
            generate_blob_key(),
        );
        content.check()?;

        // Returned to the pool when dropped, on every exit path
        let mut buffer = self.pool.acquire(0);
        until_cancelled(
            cancel,
            section.read_into(&mut buffer, self.limits.max_section_size),
        )
        .await?;

        let size = buffer.len();
        let data = buffer.share();
        let started = Instant::now();
        let put = until_cancelled(
            cancel,
            self.blobs
                .put(&content.blob_key, &content.content_type, data.clone()),
        )
        .await;
        metrics::record_blob_operation(
            self.blobs.backend_name(),
            "put",
            started.elapsed().as_secs_f64(),
        );
        buffer.reclaim(data);
        put.map_err(write_error)?;

        let id = until_cancelled(cancel, self.repository.insert(&content))
            .await
            .map_err(|e| {
                warn!(
                    "Blob {} written but metadata insert failed, blob is orphaned: {}",
                    content.blob_key, e
                );
                e
            })?;

        metrics::record_section_ingested(size);
        debug!(
            "Stored content {} ('{}', {}, {} bytes) as {}",
            id, content.file_name, content.content_type, size, content.blob_key
        );

        Ok(id)
    }

    /// Open a stored file for streaming
    pub async fn get_content(
        &self,
        id: i64,
        cancel: &CancellationToken,
    ) -> StorageResult<ContentDownload> {
        let result = self.fetch(id, cancel).await;
        metrics::record_download(outcome(&result));
        result
    }

    async fn fetch(&self, id: i64, cancel: &CancellationToken) -> StorageResult<ContentDownload> {
        if id <= 0 {
            return Err(StorageError::NotFound(format!("Content {} not found", id)));
        }

        let record = until_cancelled(cancel, self.repository.find_by_id(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Content {} not found", id)))?;

        let started = Instant::now();
        let stream = until_cancelled(cancel, self.blobs.get(&record.blob_key))
            .await
            .map_err(read_error)?;
        metrics::record_blob_operation(
            self.blobs.backend_name(),
            "get",
            started.elapsed().as_secs_f64(),
        );

        debug!("Serving content {} from {}", id, record.blob_key);

        Ok(ContentDownload {
            stream,
            file_name: record.file_name,
            content_type: record.content_type,
        })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob_store::{BlobStream, MemoryBlobBackend},
        content::repository::SqliteContentRepository,
        db,
    };
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const BOUNDARY: &str = "X-BOUNDARY";

    /// Memory backend whose n-th put (1-based) fails
    struct FailingBlobBackend {
        inner: MemoryBlobBackend,
        fail_on: usize,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl BlobBackend for FailingBlobBackend {
        async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<()> {
            if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.put(key, content_type, data).await
        }

        async fn get(&self, key: &str) -> StorageResult<BlobStream> {
            self.inner.get(key).await
        }

        async fn ping(&self) -> StorageResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    /// Memory backend that can hang in `put` or `get` until released
    struct StallingBlobBackend {
        inner: MemoryBlobBackend,
        stall_put: bool,
        stall_get: bool,
        entered: Notify,
        release: Notify,
    }

    impl StallingBlobBackend {
        fn new(inner: MemoryBlobBackend, stall_put: bool, stall_get: bool) -> Self {
            Self {
                inner,
                stall_put,
                stall_get,
                entered: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl BlobBackend for StallingBlobBackend {
        async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<()> {
            if self.stall_put {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.put(key, content_type, data).await
        }

        async fn get(&self, key: &str) -> StorageResult<BlobStream> {
            if self.stall_get {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.get(key).await
        }

        async fn ping(&self) -> StorageResult<()> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "stalling"
        }
    }

    fn file_part(name: &str, content_type: Option<&str>, data: &str) -> String {
        let mut part = format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            name
        );
        if let Some(ct) = content_type {
            part.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        part.push_str("\r\n");
        part.push_str(data);
        part
    }

    fn body(parts: &[String]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        let mut out = String::new();
        for part in parts {
            out.push_str(&format!("--{}\r\n{}\r\n", BOUNDARY, part));
        }
        out.push_str(&format!("--{}--\r\n", BOUNDARY));
        futures::stream::once(async move { Ok(Bytes::from(out)) })
    }

    async fn repository() -> Arc<dyn ContentRepository> {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        Arc::new(SqliteContentRepository::new(pool))
    }

    async fn service_with(blobs: Arc<dyn BlobBackend>, limits: IngestionConfig) -> ContentService {
        ContentService::new(repository().await, blobs, limits)
    }

    async fn read_all(download: ContentDownload) -> Vec<u8> {
        download
            .stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_section_round_trip() {
        let blobs = MemoryBlobBackend::new();
        let service = service_with(Arc::new(blobs.clone()), IngestionConfig::default()).await;
        let cancel = CancellationToken::new();

        let ids = service
            .create_content(
                body(&[file_part("a.txt", Some("text/plain"), "hello")]),
                BOUNDARY.to_string(),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(ids, vec![1]);
        assert_eq!(blobs.len().await, 1);

        let download = service.get_content(1, &cancel).await.unwrap();
        assert_eq!(download.file_name, "a.txt");
        assert_eq!(download.content_type, "text/plain");
        assert_eq!(read_all(download).await, b"hello");
    }

    #[tokio::test]
    async fn test_ids_follow_section_order() {
        let service = service_with(Arc::new(MemoryBlobBackend::new()), IngestionConfig::default()).await;
        let cancel = CancellationToken::new();

        let ids = service
            .create_content(
                body(&[
                    file_part("a.txt", Some("text/plain"), "first"),
                    file_part("b.bin", None, "second"),
                ]),
                BOUNDARY.to_string(),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);

        let second = service.get_content(2, &cancel).await.unwrap();
        assert_eq!(second.content_type, "application/octet-stream");
        assert_eq!(read_all(second).await, b"second");
    }

    #[tokio::test]
    async fn test_only_plain_fields_yields_empty_list() {
        let blobs = MemoryBlobBackend::new();
        let service = service_with(Arc::new(blobs.clone()), IngestionConfig::default()).await;

        let ids = service
            .create_content(
                body(&["Content-Disposition: form-data; name=\"title\"\r\n\r\nhello".to_string()]),
                BOUNDARY.to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(ids.is_empty());
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_earlier_sections() {
        let memory = MemoryBlobBackend::new();
        let blobs = Arc::new(FailingBlobBackend {
            inner: memory.clone(),
            fail_on: 2,
            puts: AtomicUsize::new(0),
        });
        let service = service_with(blobs, IngestionConfig::default()).await;
        let cancel = CancellationToken::new();

        let result = service
            .create_content(
                body(&[
                    file_part("a.txt", Some("text/plain"), "one"),
                    file_part("b.txt", Some("text/plain"), "two"),
                    file_part("c.txt", Some("text/plain"), "three"),
                ]),
                BOUNDARY.to_string(),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(StorageError::StorageWrite(_))));
        assert_eq!(memory.len().await, 1);

        let first = service.get_content(1, &cancel).await.unwrap();
        assert_eq!(read_all(first).await, b"one");
        assert!(matches!(
            service.get_content(2, &cancel).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_request_writes_nothing() {
        let blobs = MemoryBlobBackend::new();
        let service = service_with(Arc::new(blobs.clone()), IngestionConfig::default()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service
            .create_content(
                body(&[file_part("a.txt", Some("text/plain"), "hello")]),
                BOUNDARY.to_string(),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(StorageError::Cancelled)));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_section_count_cap() {
        let blobs = MemoryBlobBackend::new();
        let limits = IngestionConfig {
            max_sections: 1,
            ..Default::default()
        };
        let service = service_with(Arc::new(blobs.clone()), limits).await;

        let result = service
            .create_content(
                body(&[
                    file_part("a.txt", None, "one"),
                    file_part("b.txt", None, "two"),
                ]),
                BOUNDARY.to_string(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::PayloadTooLarge(_))));
        assert_eq!(blobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_section_size_cap() {
        let blobs = MemoryBlobBackend::new();
        let limits = IngestionConfig {
            max_section_size: 4,
            ..Default::default()
        };
        let service = service_with(Arc::new(blobs.clone()), limits).await;

        let result = service
            .create_content(
                body(&[file_part("big.bin", None, "0123456789")]),
                BOUNDARY.to_string(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::PayloadTooLarge(_))));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_metadata_rejected_before_write() {
        let blobs = MemoryBlobBackend::new();
        let service = service_with(Arc::new(blobs.clone()), IngestionConfig::default()).await;
        let long_type = format!("application/{}", "x".repeat(60));

        let result = service
            .create_content(
                body(&[file_part("a.bin", Some(&long_type), "data")]),
                BOUNDARY.to_string(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::Validation(_))));
        assert!(blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_buffers_return_to_pool() {
        let service = service_with(Arc::new(MemoryBlobBackend::new()), IngestionConfig::default()).await;

        service
            .create_content(
                body(&[
                    file_part("a.txt", None, "one"),
                    file_part("b.txt", None, "two"),
                ]),
                BOUNDARY.to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(service.pool().available(), 1);
    }

    #[tokio::test]
    async fn test_grown_buffers_reused_across_uploads() {
        let service = service_with(Arc::new(MemoryBlobBackend::new()), IngestionConfig::default()).await;
        let large = "x".repeat(200 * 1024);

        for name in ["first.bin", "second.bin", "third.bin"] {
            service
                .create_content(
                    body(&[file_part(name, None, &large)]),
                    BOUNDARY.to_string(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            assert_eq!(service.pool().available(), 1);
        }
    }

    #[tokio::test]
    async fn test_cancel_during_blob_write() {
        let memory = MemoryBlobBackend::new();
        let blobs = Arc::new(StallingBlobBackend::new(memory.clone(), true, false));
        let service = service_with(blobs.clone(), IngestionConfig::default()).await;
        let cancel = CancellationToken::new();

        let (result, _) = tokio::join!(
            service.create_content(
                body(&[file_part("a.txt", Some("text/plain"), "hello")]),
                BOUNDARY.to_string(),
                &cancel,
            ),
            async {
                blobs.entered.notified().await;
                cancel.cancel();
            }
        );

        assert!(matches!(result, Err(StorageError::Cancelled)));
        assert!(service.repository().find_by_id(1).await.unwrap().is_none());
        assert!(memory.is_empty().await);
        assert_eq!(service.pool().available(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_blob_read() {
        let memory = MemoryBlobBackend::new();
        let blobs = Arc::new(StallingBlobBackend::new(memory.clone(), false, true));
        let service = service_with(blobs.clone(), IngestionConfig::default()).await;

        service
            .create_content(
                body(&[file_part("a.txt", Some("text/plain"), "hello")]),
                BOUNDARY.to_string(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let (result, _) = tokio::join!(service.get_content(1, &cancel), async {
            blobs.entered.notified().await;
            cancel.cancel();
        });

        assert!(matches!(result, Err(StorageError::Cancelled)));
        // Row and blob are untouched by the aborted read
        assert_eq!(memory.len().await, 1);
        assert!(service.repository().find_by_id(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let service = service_with(Arc::new(MemoryBlobBackend::new()), IngestionConfig::default()).await;
        let cancel = CancellationToken::new();

        assert!(matches!(
            service.get_content(42, &cancel).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            service.get_content(0, &cancel).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_blob_is_read_error() {
        let blobs = MemoryBlobBackend::new();
        let service = service_with(Arc::new(blobs.clone()), IngestionConfig::default()).await;
        let cancel = CancellationToken::new();

        service
            .create_content(
                body(&[file_part("a.txt", None, "hello")]),
                BOUNDARY.to_string(),
                &cancel,
            )
            .await
            .unwrap();
        let record = service.repository().find_by_id(1).await.unwrap().unwrap();
        blobs.remove(&record.blob_key).await;

        assert!(matches!(
            service.get_content(1, &cancel).await,
            Err(StorageError::StorageRead(_))
        ));
    }
}
