//! Request handlers

use super::AppState;
use crate::error::{PhotoError, Result};
use crate::processor::{UploadedAsset, NO_FILE_MESSAGE};
use crate::transforms::Operation;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use tracing::debug;

const INDEX_HTML: &str = include_str!("templates/index.html");

/// Name of the multipart part carrying the upload
pub const FILE_FIELD: &str = "file";

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn remove_background(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    run(state, Operation::RemoveBackground, multipart).await
}

pub async fn enhance_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    run(state, Operation::Enhance, multipart).await
}

pub async fn compress_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    run(state, Operation::Compress, multipart).await
}

async fn run(
    state: AppState,
    operation: Operation,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    // A body that is not multipart carries no file part
    let multipart = multipart.map_err(|rejection| {
        debug!(%rejection, "request is not multipart");
        PhotoError::missing_upload(NO_FILE_MESSAGE)
    })?;

    let asset = read_upload(multipart, state.max_upload_bytes).await?;
    asset.declared_filename()?;

    let processor = state.processor.clone();
    let result = tokio::task::spawn_blocking(move || processor.process(operation, &asset))
        .await
        .map_err(|e| PhotoError::internal(format!("{operation} task failed: {e}")))??;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, result.content_type)],
        result.bytes,
    )
        .into_response())
}

/// Read the first `file` part that declares a filename
///
/// Parts without a filename parameter are plain form fields and are ignored,
/// so a form with only a text `file` field counts as having no upload.
async fn read_upload(mut multipart: Multipart, limit: usize) -> Result<UploadedAsset> {
    let into_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            PhotoError::PayloadTooLarge { limit }
        } else {
            PhotoError::missing_upload(e.body_text())
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(into_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(ToOwned::to_owned) else {
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(into_error)? {
            bytes.extend_from_slice(&chunk);
        }
        debug!(filename = %filename, size = bytes.len(), "received upload");
        return Ok(UploadedAsset::new(bytes, Some(filename)));
    }

    Ok(UploadedAsset::new(Vec::new(), None))
}
