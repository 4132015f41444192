/// Content ingestion and retrieval
pub mod models;
pub mod repository;
pub mod service;

pub use models::{ContentDownload, ContentRecord, CreateContentResponse, NewContent};
pub use repository::{ContentRepository, PostgresContentRepository, SqliteContentRepository};
pub use service::ContentService;
