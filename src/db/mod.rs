/// Database layer for content metadata
///
/// Manages connections and migrations for the SQLite (default) and
/// PostgreSQL metadata stores.

pub mod postgres;

use crate::{
    config::DatabaseConfig,
    content::{ContentRepository, PostgresContentRepository, SqliteContentRepository},
    error::{StorageError, StorageResult},
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> StorageResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Create a single-connection in-memory SQLite pool
///
/// Every SQLite in-memory connection is its own database, so the pool is
/// pinned to one connection that never expires.
pub async fn create_memory_pool() -> StorageResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::new().in_memory(true))
        .await?;

    Ok(pool)
}

/// Run migrations for the SQLite database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> StorageResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StorageError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> StorageResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Connect to the configured metadata store, migrate it and wrap it in a repository
pub async fn connect_repository(config: &DatabaseConfig) -> StorageResult<Arc<dyn ContentRepository>> {
    match config {
        DatabaseConfig::Sqlite { path } => {
            let pool = if path.as_os_str() == ":memory:" {
                create_memory_pool().await?
            } else {
                create_pool(path, DatabaseOptions::default()).await?
            };
            run_migrations(&pool).await?;
            test_connection(&pool).await?;
            tracing::info!("✓ SQLite metadata store ready at {}", path.display());
            Ok(Arc::new(SqliteContentRepository::new(pool)))
        }
        DatabaseConfig::Postgres {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
        } => {
            let settings = postgres::PgPoolSettings {
                max_connections: *max_connections,
                min_connections: *min_connections,
                acquire_timeout: std::time::Duration::from_secs(*acquire_timeout_secs),
            };
            let pool = postgres::open(url, &settings).await?;
            Ok(Arc::new(PostgresContentRepository::new(pool)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_pool_and_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("contents.sqlite");

        let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_memory_repository() {
        let repo = connect_repository(&DatabaseConfig::Sqlite {
            path: ":memory:".into(),
        })
        .await
        .unwrap();
        assert!(repo.ping().await.is_ok());
    }
}
