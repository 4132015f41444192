/// PostgreSQL metadata store
///
/// Used when `DATABASE_URL` points at Postgres, so several service
/// instances can share one `contents` table.

use crate::error::{StorageError, StorageResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Pool settings for the Postgres metadata store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgPoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

/// Pool options for the given settings; the minimum never exceeds the maximum
pub fn pool_options(settings: &PgPoolSettings) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections.min(settings.max_connections))
        .acquire_timeout(settings.acquire_timeout)
}

/// Open the pool and bring the schema up to date
pub async fn open(url: &str, settings: &PgPoolSettings) -> StorageResult<PgPool> {
    let pool = pool_options(settings).connect(url).await?;

    sqlx::migrate!("./migrations/postgres")
        .run(&pool)
        .await
        .map_err(|e| StorageError::Internal(format!("Migration failed: {}", e)))?;

    info!(
        "✓ PostgreSQL metadata store ready ({}..{} connections)",
        settings.min_connections.min(settings.max_connections),
        settings.max_connections
    );
    Ok(pool)
}
