/// Application context and dependency injection
use crate::{
    blob_store::{self, BlobBackend},
    config::ServerConfig,
    content::{ContentRepository, ContentService},
    db,
    error::StorageResult,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub content: ContentService,
    /// Root token, cancelled when the server shuts down
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> StorageResult<Self> {
        // Validate configuration
        config.validate()?;

        // Metadata store (migrations run on connect)
        let repository = db::connect_repository(&config.database).await?;

        // Blob store
        let blobs = blob_store::create_backend(&config.blobstore).await?;

        Ok(Self::from_parts(config, repository, blobs))
    }

    /// Assemble a context from already-built stores
    pub fn from_parts(
        config: ServerConfig,
        repository: Arc<dyn ContentRepository>,
        blobs: Arc<dyn BlobBackend>,
    ) -> Self {
        let content = ContentService::new(repository, blobs, config.ingestion.clone());
        Self {
            config: Arc::new(config),
            content,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancellation token for one request, cancelled with the server
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
