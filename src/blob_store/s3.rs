/// S3-compatible blob storage backend
use crate::blob_store::{BlobBackend, BlobStream};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info};

/// S3 blob storage backend
///
/// Supports AWS S3 and S3-compatible storage providers (MinIO, DigitalOcean Spaces, etc.)
#[derive(Clone)]
pub struct S3BlobBackend {
    client: Arc<Client>,
    bucket: String,
    region: String,
    prefix: String,
}

/// Configuration for S3 storage
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g., "us-east-1")
    pub region: String,

    /// Custom endpoint for S3-compatible services (e.g., MinIO, DigitalOcean Spaces)
    /// Example: "https://nyc3.digitaloceanspaces.com" or "http://localhost:9000"
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Path prefix prepended to every object key
    pub prefix: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            prefix: String::new(),
        }
    }
}

impl S3BlobBackend {
    /// Create a new S3 blob backend
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        info!(
            "Initializing S3 blob storage (bucket: {}, region: {})",
            config.bucket, config.region
        );

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None, // session token
            None, // expiration
            "content-storage",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO and some S3-compatible services
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client: Arc::new(client),
            bucket: config.bucket,
            region: config.region,
            prefix: config.prefix,
        })
    }

    /// Get the S3 object key for a blob key
    fn object_key(&self, key: &str) -> String {
        object_key(&self.prefix, key)
    }

    /// Create the bucket when it does not exist yet
    ///
    /// Failures are logged and startup continues; writes will surface
    /// the problem as storage errors.
    pub async fn ensure_bucket(&self) {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            debug!("S3 bucket {} exists", self.bucket);
            return;
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => info!("✓ Created S3 bucket {}", self.bucket),
            Err(e) => error!("Error occurred while trying to create bucket {}: {}", self.bucket, e),
        }
    }
}

fn object_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl BlobBackend for S3BlobBackend {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<()> {
        let key = self.object_key(key);

        debug!(
            "Uploading blob to S3: {} ({} bytes, type: {})",
            key,
            data.len(),
            content_type
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload blob to S3: {}", e);
                StorageError::StorageWrite(format!("S3 upload failed: {}", e))
            })?;

        debug!("✓ Blob uploaded to S3: {}", key);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<BlobStream> {
        let key = self.object_key(key);

        debug!("Opening blob from S3: {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StorageError::StorageRead(format!("Blob {} is missing from S3", key))
                } else {
                    error!("Failed to download blob from S3: {}", e);
                    StorageError::StorageRead(format!("S3 download failed: {}", e))
                }
            })?;

        // Pass the body through chunk by chunk; never collect it.
        let stream = futures::stream::try_unfold(response.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(std::io::Error::other(e)),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::StorageRead(format!("S3 bucket not accessible: {}", e)))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
