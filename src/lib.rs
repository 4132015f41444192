/// Content Storage - multipart file upload and retrieval service
///
/// Stores uploaded file bytes in a blob store (disk, S3 or memory) and their
/// metadata in SQLite or PostgreSQL, handing back integer content ids.

pub mod api;
pub mod blob_store;
pub mod buffer_pool;
pub mod config;
pub mod content;
pub mod context;
pub mod db;
pub mod error;
pub mod metrics;
pub mod multipart;
pub mod server;
