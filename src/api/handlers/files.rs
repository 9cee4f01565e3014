use crate::api::error::AppError;
use crate::services::records;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct FileDataResponse {
    pub downloads: i64,
    pub filename: String,
    pub filesize: i64,
    pub filetype: String,
}

#[derive(Serialize, ToSchema)]
pub struct ListEntry {
    pub id: String,
    pub key: String,
    pub filename: String,
    pub filesize: i64,
    pub filetype: String,
    pub downloads: i64,
}

/// Splits the wildcard remainder of a `/file` or `/data` route into the
/// namespace key and the generated id (the stored filename stem).
fn split_address(rest: &str) -> Result<(&str, &str), AppError> {
    let (key, stored_name) = rest
        .rsplit_once('/')
        .ok_or_else(|| AppError::BadRequest("No id specified".to_string()))?;
    if key.is_empty() {
        return Err(AppError::BadRequest("No key specified".to_string()));
    }
    let id = stored_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(stored_name);
    if id.is_empty() {
        return Err(AppError::BadRequest("No id specified".to_string()));
    }
    Ok((key, id))
}

#[utoipa::path(
    get,
    path = "/file/{app}/{key_and_id}",
    params(
        ("app" = String, Path, description = "Application name"),
        ("key_and_id" = String, Path, description = "Namespace key followed by `<id>.<ext>`")
    ),
    responses(
        (status = 200, description = "File content stream"),
        (status = 404, description = "Record or backing file not found"),
        (status = 500, description = "Stream error")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<crate::AppState>,
    Path((app, rest)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (key, id) = split_address(&rest)?;

    let record = records::find_by_address(&state.db, &app, key, id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    // Count the download before streaming; a missing backing file below
    // also purges the record, so an inflated counter cannot survive.
    let record = records::increment_downloads(&state.db, record).await?;

    let file = match tokio::fs::File::open(&record.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Self-healing: metadata must not outlive the file it describes.
            tracing::warn!(
                "backing file missing for {}, purging orphaned record",
                record.path
            );
            records::delete_by_path(&state.db, &record.path).await?;
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Err(e) => return Err(AppError::Storage(e.to_string())),
    };

    let (content_type, content_disposition, ascii_name) =
        resolve_file_headers(&record.filename, &record.filetype);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header("File-Name", ascii_name)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[utoipa::path(
    get,
    path = "/data/{app}/{key_and_id}",
    params(
        ("app" = String, Path, description = "Application name"),
        ("key_and_id" = String, Path, description = "Namespace key followed by `<id>.<ext>`")
    ),
    responses(
        (status = 200, description = "Stored attributes", body = FileDataResponse),
        (status = 404, description = "Record not found")
    ),
    tag = "files"
)]
pub async fn file_data(
    State(state): State<crate::AppState>,
    Path((app, rest)): Path<(String, String)>,
) -> Result<Json<FileDataResponse>, AppError> {
    let (key, id) = split_address(&rest)?;

    let record = records::find_by_address(&state.db, &app, key, id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    Ok(Json(FileDataResponse {
        downloads: record.downloads,
        filename: record.filename,
        filesize: record.filesize,
        filetype: record.filetype,
    }))
}

#[utoipa::path(
    get,
    path = "/list/{app}/{key}",
    params(
        ("app" = String, Path, description = "Application name"),
        ("key" = String, Path, description = "Namespace key")
    ),
    responses(
        (status = 200, description = "Records in scope", body = Vec<ListEntry>)
    ),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<crate::AppState>,
    Path((app, key)): Path<(String, String)>,
) -> Result<Json<Vec<ListEntry>>, AppError> {
    let records = records::list_scope(&state.db, &app, &key).await?;

    Ok(Json(
        records
            .into_iter()
            .map(|record| ListEntry {
                id: record.id,
                key: record.key,
                filename: record.filename,
                filesize: record.filesize,
                filetype: record.filetype,
                downloads: record.downloads,
            })
            .collect(),
    ))
}

/// Resolve content-type, content-disposition and a header-safe filename
/// for a stored file.
pub(crate) fn resolve_file_headers(filename: &str, filetype: &str) -> (String, String, String) {
    let content_type = if filetype.is_empty() {
        "application/octet-stream".to_string()
    } else {
        filetype.to_string()
    };

    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file".to_string()
    } else {
        ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    let disposition_type = if content_type.starts_with("video/")
        || content_type.starts_with("audio/")
        || content_type.starts_with("image/")
        || content_type == "application/pdf"
        || content_type.starts_with("text/")
    {
        "inline"
    } else {
        "attachment"
    };

    let content_disposition = format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition_type, fallback_filename, encoded_filename
    );

    (content_type, content_disposition, fallback_filename)
}
