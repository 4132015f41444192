/// Content data models
use crate::{
    blob_store::BlobStream,
    error::{StorageError, StorageResult},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Stored file metadata, one row of the `contents` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: i64,
    pub file_name: String,
    pub content_type: String,
    pub blob_key: String,
}

/// Metadata row to insert once its blob has been written
#[derive(Debug, Clone, Validate)]
pub struct NewContent {
    #[validate(length(min = 1, max = 150, message = "File name must be between 1 and 150 characters."))]
    pub file_name: String,

    #[validate(length(min = 1, max = 50, message = "Content type must be between 1 and 50 characters."))]
    pub content_type: String,

    #[validate(length(min = 1, max = 100, message = "Blob key must be between 1 and 100 characters."))]
    pub blob_key: String,
}

impl NewContent {
    pub fn new(file_name: &str, content_type: &str, blob_key: String) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            blob_key,
        }
    }

    /// Check column bounds before anything is written
    pub fn check(&self) -> StorageResult<()> {
        self.validate()
            .map_err(|e| StorageError::Validation(e.to_string()))
    }
}

/// Generate a fresh, unguessable blob key
///
/// Keys are random and never derived from the file name.
pub fn generate_blob_key() -> String {
    format!("content/{}", Uuid::new_v4().simple())
}

/// Response for a multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContentResponse {
    pub content_ids: Vec<i64>,
}

/// A file ready to be streamed back to the caller
pub struct ContentDownload {
    pub stream: BlobStream,
    pub file_name: String,
    pub content_type: String,
}
