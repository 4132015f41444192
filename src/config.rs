/// Configuration management for the content storage service
use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub blobstore: BlobstoreConfig,
    pub ingestion: IngestionConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Upper bound on a whole request body in bytes
    pub max_request_size: usize,
}

/// Metadata database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatabaseConfig {
    Sqlite {
        path: PathBuf,
    },
    Postgres {
        url: String,
        max_connections: u32,
        min_connections: u32,
        /// Seconds to wait for a free pooled connection
        acquire_timeout_secs: u64,
    },
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlobstoreConfig {
    Disk {
        location: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        access_key_id: String,
        secret_access_key: String,
        endpoint: Option<String>,
        prefix: String,
    },
    Memory,
}

/// Limits applied while ingesting a multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Largest accepted file section in bytes
    pub max_section_size: usize,
    /// Largest number of file sections in one request
    pub max_sections: usize,
    /// Buffers kept per pool tier
    pub pool_buffers_per_tier: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_section_size: 64 * 1024 * 1024, // 64MB
            max_sections: 32,
            pool_buffers_per_tier: 8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> StorageResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("STORAGE_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("STORAGE_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| StorageError::Validation("Invalid port number".to_string()))?;
        let max_request_size = env_parse("STORAGE_MAX_REQUEST_SIZE", 512 * 1024 * 1024);

        let data_directory: PathBuf = env::var("STORAGE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();

        let database = match env::var("DATABASE_URL") {
            Ok(url) if url.starts_with("postgres") => DatabaseConfig::Postgres {
                url,
                max_connections: env_parse("STORAGE_DB_MAX_CONNECTIONS", 20),
                min_connections: env_parse("STORAGE_DB_MIN_CONNECTIONS", 2),
                acquire_timeout_secs: env_parse("STORAGE_DB_ACQUIRE_TIMEOUT_SECS", 30),
            },
            _ => DatabaseConfig::Sqlite {
                path: env::var("STORAGE_SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("contents.sqlite")),
            },
        };

        let blobstore = if let Ok(bucket) = env::var("STORAGE_S3_BUCKET") {
            BlobstoreConfig::S3 {
                bucket,
                region: env::var("STORAGE_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: env::var("STORAGE_S3_ACCESS_KEY_ID")
                    .map_err(|_| StorageError::Validation("S3 access key required".to_string()))?,
                secret_access_key: env::var("STORAGE_S3_SECRET_ACCESS_KEY")
                    .map_err(|_| StorageError::Validation("S3 secret key required".to_string()))?,
                endpoint: env::var("STORAGE_S3_ENDPOINT").ok(),
                prefix: env::var("STORAGE_S3_PREFIX").unwrap_or_default(),
            }
        } else if env::var("STORAGE_BLOBSTORE").as_deref() == Ok("memory") {
            BlobstoreConfig::Memory
        } else {
            BlobstoreConfig::Disk {
                location: env::var("STORAGE_BLOBSTORE_DISK_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("blobs")),
            }
        };

        let defaults = IngestionConfig::default();
        let ingestion = IngestionConfig {
            max_section_size: env_parse("STORAGE_MAX_SECTION_SIZE", defaults.max_section_size),
            max_sections: env_parse("STORAGE_MAX_SECTIONS", defaults.max_sections),
            pool_buffers_per_tier: env_parse(
                "STORAGE_POOL_BUFFERS_PER_TIER",
                defaults.pool_buffers_per_tier,
            ),
        };

        let logging = LoggingConfig {
            level: env::var("STORAGE_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),
            json: env::var("STORAGE_LOG_FORMAT").as_deref() == Ok("json"),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                max_request_size,
            },
            database,
            blobstore,
            ingestion,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> StorageResult<()> {
        if self.service.hostname.is_empty() {
            return Err(StorageError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.ingestion.max_section_size == 0 || self.ingestion.max_sections == 0 {
            return Err(StorageError::Validation(
                "Ingestion limits must be greater than zero".to_string(),
            ));
        }

        if let DatabaseConfig::Postgres {
            max_connections,
            acquire_timeout_secs,
            ..
        } = &self.database
        {
            if *max_connections == 0 || *acquire_timeout_secs == 0 {
                return Err(StorageError::Validation(
                    "Postgres pool size and acquire timeout must be greater than zero".to_string(),
                ));
            }
        }

        if let BlobstoreConfig::S3 { bucket, .. } = &self.blobstore {
            if bucket.is_empty() {
                return Err(StorageError::Validation("S3 bucket cannot be empty".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                max_request_size: 1024,
            },
            database: DatabaseConfig::Sqlite {
                path: PathBuf::from(":memory:"),
            },
            blobstore: BlobstoreConfig::Memory,
            ingestion: IngestionConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_empty_hostname_rejected() {
        let mut config = sample();
        config.service.hostname.clear();
        assert!(matches!(config.validate(), Err(StorageError::Validation(_))));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = sample();
        config.ingestion.max_sections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_pool_settings_validated() {
        let mut config = sample();
        config.database = DatabaseConfig::Postgres {
            url: "postgresql://localhost/content".to_string(),
            max_connections: 0,
            min_connections: 0,
            acquire_timeout_secs: 30,
        };
        assert!(config.validate().is_err());

        config.database = DatabaseConfig::Postgres {
            url: "postgresql://localhost/content".to_string(),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_secs: 30,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let mut config = sample();
        config.blobstore = BlobstoreConfig::S3 {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint: None,
            prefix: String::new(),
        };
        assert!(config.validate().is_err());
    }
}
