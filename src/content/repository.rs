/// Metadata repository for content records
use crate::{
    content::models::{ContentRecord, NewContent},
    error::StorageResult,
};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, sqlite::SqliteRow, PgPool, Row, SqlitePool};

/// Storage of content metadata rows
///
/// Ids are assigned by the store on insert and never reused.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert a row and return its assigned id
    async fn insert(&self, content: &NewContent) -> StorageResult<i64>;

    /// Look up a row by id
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<ContentRecord>>;

    /// Connectivity check used by the readiness endpoint
    async fn ping(&self) -> StorageResult<()>;
}

fn record_from_sqlite(row: &SqliteRow) -> Result<ContentRecord, sqlx::Error> {
    Ok(ContentRecord {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        blob_key: row.try_get("blob_key")?,
    })
}

fn record_from_postgres(row: &PgRow) -> Result<ContentRecord, sqlx::Error> {
    Ok(ContentRecord {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        blob_key: row.try_get("blob_key")?,
    })
}

/// SQLite-backed repository
#[derive(Clone)]
pub struct SqliteContentRepository {
    db: SqlitePool,
}

impl SqliteContentRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContentRepository for SqliteContentRepository {
    async fn insert(&self, content: &NewContent) -> StorageResult<i64> {
        let result = sqlx::query(
            "INSERT INTO contents (file_name, content_type, blob_key) VALUES (?1, ?2, ?3)",
        )
        .bind(&content.file_name)
        .bind(&content.content_type)
        .bind(&content.blob_key)
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<ContentRecord>> {
        let row = sqlx::query(
            "SELECT id, file_name, content_type, blob_key FROM contents WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.as_ref().map(record_from_sqlite).transpose()?)
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PostgresContentRepository {
    db: PgPool,
}

impl PostgresContentRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContentRepository for PostgresContentRepository {
    async fn insert(&self, content: &NewContent) -> StorageResult<i64> {
        let row = sqlx::query(
            "INSERT INTO contents (file_name, content_type, blob_key) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&content.file_name)
        .bind(&content.content_type)
        .bind(&content.blob_key)
        .fetch_one(&self.db)
        .await?;

        Ok(row.try_get::<i64, _>("id")?)
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<ContentRecord>> {
        let row = sqlx::query(
            "SELECT id, file_name, content_type, blob_key FROM contents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.as_ref().map(record_from_postgres).transpose()?)
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
