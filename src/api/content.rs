/// Upload and download endpoints for stored files
use crate::{
    content::CreateContentResponse,
    context::AppContext,
    error::{StorageError, StorageResult},
    multipart,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Build content routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/content", post(create_content))
        .route("/content/:id", get(get_content))
}

/// Store the file sections of a multipart upload
///
/// The Content-Type is checked before any of the body is read, so a
/// non-multipart request has no side effects.
async fn create_content(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Body,
) -> StorageResult<impl IntoResponse> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let boundary = multipart::parse_boundary(content_type)?;

    let cancel = ctx.request_token();
    let content_ids = ctx
        .content
        .create_content(body.into_data_stream(), boundary, &cancel)
        .await?;

    Ok((StatusCode::OK, Json(CreateContentResponse { content_ids })))
}

/// Stream a stored file back as an attachment
async fn get_content(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> StorageResult<Response> {
    let id: i64 = id
        .parse()
        .map_err(|_| StorageError::NotFound(format!("Content {} not found", id)))?;

    let cancel = ctx.request_token();
    let download = ctx.content.get_content(id, &cancel).await?;

    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(multipart::DEFAULT_CONTENT_TYPE));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&download.file_name),
        )
        .body(Body::from_stream(download.stream))
        .map_err(|e| StorageError::Internal(format!("Failed to build response: {}", e)))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name
fn content_disposition(file_name: &str) -> String {
    let fallback_name: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    let encoded_name = urlencoding::encode(file_name);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_name, encoded_name
    )
}
