/// Multipart decoding for uploads
///
/// Wraps `multer` into a forward-only sequence of file sections. Sections
/// that are not files (plain form fields, other disposition types) are
/// skipped without error.
use crate::{
    buffer_pool::PooledBuffer,
    error::{StorageError, StorageResult},
};
use bytes::Bytes;
use futures::Stream;

/// Default content type for sections that declare none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Extract the boundary from a request Content-Type header
///
/// Non-multipart content types are rejected before any body is read.
pub fn parse_boundary(content_type: Option<&str>) -> StorageResult<String> {
    let content_type = content_type.ok_or_else(|| {
        StorageError::MalformedMultipart("Missing Content-Type header".to_string())
    })?;

    if !content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/")
    {
        return Err(StorageError::MalformedMultipart(format!(
            "Expected a multipart content type, got '{}'",
            content_type
        )));
    }

    multer::parse_boundary(content_type).map_err(|e| {
        StorageError::MalformedMultipart(format!("Invalid multipart boundary: {}", e))
    })
}

/// Disposition type of a Content-Disposition header value ("form-data", "attachment", ...)
fn disposition_type(header: &str) -> &str {
    header.split(';').next().unwrap_or("").trim()
}

fn is_form_data(header: Option<&str>) -> bool {
    header
        .map(|h| disposition_type(h).eq_ignore_ascii_case("form-data"))
        .unwrap_or(false)
}

/// Whether a body read failed because the request body limit was hit
fn exceeded_body_limit(e: &multer::Error) -> bool {
    let multer::Error::StreamReadFailed(source) = e else {
        return false;
    };
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(source.as_ref());
    while let Some(err) = current {
        if err.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}

fn framing_error(e: multer::Error) -> StorageError {
    if exceeded_body_limit(&e) {
        return StorageError::PayloadTooLarge(
            "Request body exceeds the configured size limit".to_string(),
        );
    }
    StorageError::MalformedMultipart(format!("Corrupt multipart framing: {}", e))
}

/// Forward-only reader of file sections from a multipart body
pub struct SectionDecoder {
    inner: multer::Multipart<'static>,
    position: usize,
}

impl SectionDecoder {
    pub fn new<S, O, E>(body: S, boundary: impl Into<String>) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        Self {
            inner: multer::Multipart::new(body, boundary),
            position: 0,
        }
    }

    /// Advance to the next file section, skipping anything that is not one
    pub async fn next_file_section(&mut self) -> StorageResult<Option<FileSection>> {
        while let Some(field) = self.inner.next_field().await.map_err(framing_error)? {
            let position = self.position;
            self.position += 1;

            let disposition = field
                .headers()
                .get("content-disposition")
                .and_then(|v| v.to_str().ok());
            let file_name = field
                .file_name()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);

            match file_name {
                Some(file_name) if is_form_data(disposition) => {
                    let content_type = field.content_type().map(|m| m.to_string());
                    return Ok(Some(FileSection {
                        field,
                        file_name,
                        content_type,
                        position,
                    }));
                }
                _ => {
                    tracing::trace!(
                        "Skipping non-file multipart section {} ({:?})",
                        position,
                        field.name()
                    );
                }
            }
        }

        Ok(None)
    }
}

/// One file part of a multipart upload, positioned at its body
pub struct FileSection {
    field: multer::Field<'static>,
    file_name: String,
    content_type: Option<String>,
    position: usize,
}

impl FileSection {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Content type as declared by the uploader
    pub fn declared_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared content type, or the octet-stream default
    pub fn content_type(&self) -> &str {
        self.declared_content_type().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Index of this section among all sections of the body
    pub fn position(&self) -> usize {
        self.position
    }

    /// Buffer the whole section body, failing once it exceeds `max_size` bytes
    pub async fn read_into(&mut self, buf: &mut PooledBuffer, max_size: usize) -> StorageResult<()> {
        while let Some(chunk) = self.field.chunk().await.map_err(framing_error)? {
            if buf.len() + chunk.len() > max_size {
                return Err(StorageError::PayloadTooLarge(format!(
                    "File '{}' exceeds maximum section size of {} bytes",
                    self.file_name, max_size
                )));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(())
    }
}
