use crate::api::error::AppError;
use crate::services::upload_service;
use crate::utils::validation;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Percent-encoded JSON resize options, e.g. `{"width":256}`.
    pub resize: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadedFile {
    pub filename: String,
    pub url: String,
    pub size: i64,
    pub mimetype: String,
}

#[utoipa::path(
    post,
    path = "/{app}/{key}",
    params(
        ("app" = String, Path, description = "Application name"),
        ("key" = String, Path, description = "Namespace key (may span multiple segments)"),
        ("resize" = Option<String>, Query, description = "JSON resize options applied to image parts")
    ),
    request_body(content = String, description = "Multipart form data with one or more file parts"),
    responses(
        (status = 200, description = "All files stored", body = Vec<UploadedFile>),
        (status = 400, description = "Missing app/key/files or invalid file"),
        (status = 409, description = "Destination path already being written"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Processing or storage failure")
    ),
    tag = "files"
)]
pub async fn upload_files(
    State(state): State<crate::AppState>,
    Path((app, key)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadedFile>>, AppError> {
    validation::validate_app_name(&app).map_err(|e| AppError::BadRequest(e.to_string()))?;
    validation::validate_key(&key).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut received = Vec::new();

    // Capture errors in a result so the remaining multipart stream can be
    // consumed before responding; aborting mid-body resets the connection.
    let result: Result<Json<Vec<UploadedFile>>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            let msg = e.to_string();
            if msg.contains("length limit exceeded") {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(msg)
            }
        })? {
            if field.file_name().is_none() {
                // Not a file part; drain and ignore.
                let _ = field.text().await;
                continue;
            }

            let original_filename = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|s| s.to_string());

            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(body_with_io_error);
            received.push(
                state
                    .uploads
                    .spool(original_filename, content_type, reader)
                    .await?,
            );
        }

        // A client disconnect drops this handler future; the pipelines run
        // in their own task so locks and partial placements still unwind.
        let uploads = state.uploads.clone();
        let scope_app = app.clone();
        let scope_key = key.clone();
        let resize = query.resize.clone();
        let files = std::mem::take(&mut received);
        let placed = tokio::spawn(async move {
            uploads
                .process_request(&scope_app, &scope_key, resize.as_deref(), files)
                .await
        })
        .await
        .map_err(|e| AppError::Internal(format!("upload task failed: {e}")))??;

        Ok(Json(
            placed
                .into_iter()
                .map(|record| UploadedFile {
                    filename: record.filename,
                    url: record.fileurl,
                    size: record.filesize,
                    mimetype: record.filetype,
                })
                .collect(),
        ))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            upload_service::discard_files(&received).await;
            tracing::warn!("Upload failed: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

/// `POST /:app` without a key segment.
pub async fn missing_key() -> AppError {
    AppError::BadRequest("No key specified".to_string())
}
