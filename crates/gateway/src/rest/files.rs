//! Upload side-channel for file sharing

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::BytesMut;
use huddle_chats::{ChatError, FileHandle, StorageKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::state::GatewayState;

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Retrieval path for the stored file
    pub url: String,
    /// Storage key to send in a `file` event
    pub key: String,
    pub filename: String,
    pub size: u64,
}

impl From<FileHandle> for UploadResponse {
    fn from(handle: FileHandle) -> Self {
        Self {
            url: handle.url(),
            key: handle.storage_key.to_string(),
            filename: handle.original_filename,
            size: handle.size_bytes,
        }
    }
}

/// Create file routes
pub fn create_file_routes(max_bytes: u64) -> Router<Arc<GatewayState>> {
    let body_limit = usize::try_from(max_bytes.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files/:key", get(download_file))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Files",
    request_body(content = String, content_type = "multipart/form-data", description = "Form with one file field"),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file field in the form", body = ErrorResponse),
        (status = 413, description = "File exceeds the upload limit", body = ErrorResponse),
        (status = 507, description = "Upload storage is full", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<GatewayState>>,
    mut multipart: Multipart,
) -> GatewayResult<(StatusCode, Json<UploadResponse>)> {
    let limit = state.relay.max_bytes();

    while let Some(mut field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await? {
            let size = (data.len() + chunk.len()) as u64;
            if size > limit {
                tracing::warn!(%filename, limit, "upload rejected, too large");
                return Err(ChatError::FileTooLarge { size, limit }.into());
            }
            data.extend_from_slice(&chunk);
        }

        let handle = state
            .relay
            .store(&filename, content_type.as_deref(), &data)
            .await?;
        tracing::info!(
            key = %handle.storage_key,
            filename = %handle.original_filename,
            size = handle.size_bytes,
            "file uploaded"
        );

        return Ok((StatusCode::CREATED, Json(handle.into())));
    }

    Err(GatewayError::InvalidRequest(
        "multipart form contains no file field".to_string(),
    ))
}

#[utoipa::path(
    get,
    path = "/files/{key}",
    tag = "Files",
    params(
        ("key" = String, Path, description = "Storage key returned by the upload")
    ),
    responses(
        (status = 200, description = "File contents, served as an attachment"),
        (status = 404, description = "Unknown key", body = ErrorResponse)
    )
)]
pub async fn download_file(
    Path(key): Path<String>,
    State(state): State<Arc<GatewayState>>,
) -> GatewayResult<Response<Body>> {
    let key = StorageKey::parse(&key).ok_or_else(|| ChatError::file_not_found(key))?;
    let (handle, data) = state.relay.retrieve(&key).await?;

    let content_type = HeaderValue::from_str(&handle.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", header_filename(&handle.original_filename)),
        )
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from(data))
        .map_err(|_| GatewayError::InternalError("Failed to create response".to_string()))
}

/// ASCII-only filename for a quoted `Content-Disposition` parameter.
fn header_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_filename_strips_quotes_and_non_ascii() {
        assert_eq!(header_filename("report \"final\".pdf"), "report _final_.pdf");
        assert_eq!(header_filename("résumé.txt"), "r_sum_.txt");
    }
}
