use crate::api::error::AppError;
use crate::config::ServerConfig;
use crate::entities::files;
use crate::services::path_lock::PathLockRegistry;
use crate::services::transform::ResizeOptions;
use crate::services::{fs_ops, records, transform};
use crate::utils::{paths, validation};
use futures::future::join_all;
use sea_orm::DatabaseConnection;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

/// How many spooled bytes are kept around for content sniffing.
const SNIFF_LEN: usize = 1024;

/// A file part that has been spooled to the staging area but not yet
/// admitted into storage.
#[derive(Debug)]
pub struct ReceivedFile {
    pub generated_id: String,
    pub original_filename: Option<String>,
    pub declared_mime: Option<String>,
    pub size: u64,
    pub spool_path: PathBuf,
    pub header: Vec<u8>,
}

/// The upload admission pipeline: per file, validate, optionally
/// transform, lock the destination path, place atomically, persist the
/// record, and unwind on any failure.
pub struct UploadService {
    db: DatabaseConnection,
    locks: PathLockRegistry,
    config: ServerConfig,
}

impl UploadService {
    pub fn new(db: DatabaseConnection, locks: PathLockRegistry, config: ServerConfig) -> Self {
        Self { db, locks, config }
    }

    /// Spools one multipart file part into the staging area, enforcing
    /// the size limit and capturing header bytes for sniffing.
    pub async fn spool(
        &self,
        original_filename: Option<String>,
        declared_mime: Option<String>,
        reader: impl AsyncRead + Send,
    ) -> Result<ReceivedFile, AppError> {
        tokio::pin!(reader);
        let staging = paths::staging_dir(&self.config.upload_root);
        fs_ops::ensure_directory(&staging)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create staging directory: {e}")))?;

        let generated_id = Uuid::new_v4().simple().to_string();
        let spool_path = staging.join(format!("{generated_id}.part"));
        let mut spool = fs::File::create(&spool_path)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let mut header = Vec::with_capacity(SNIFF_LEN);
        let mut size: u64 = 0;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    discard(&spool_path).await;
                    return Err(AppError::BadRequest(format!("Upload stream failed: {e}")));
                }
            };
            size += n as u64;
            if size > self.config.max_file_size as u64 {
                discard(&spool_path).await;
                return Err(AppError::PayloadTooLarge(
                    "File exceeds the maximum allowed size".to_string(),
                ));
            }
            if header.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - header.len()).min(n);
                header.extend_from_slice(&buffer[..take]);
            }
            if let Err(e) = spool.write_all(&buffer[..n]).await {
                discard(&spool_path).await;
                return Err(AppError::Storage(e.to_string()));
            }
        }
        if let Err(e) = spool.flush().await {
            discard(&spool_path).await;
            return Err(AppError::Storage(e.to_string()));
        }

        Ok(ReceivedFile {
            generated_id,
            original_filename,
            declared_mime,
            size,
            spool_path,
            header,
        })
    }

    /// Runs the per-file pipelines for one request. All pipelines run
    /// concurrently; one file's failure does not cancel its siblings,
    /// but the request fails if any file failed. Successfully placed
    /// siblings stay on disk and in the store.
    pub async fn process_request(
        &self,
        app: &str,
        key: &str,
        resize: Option<&str>,
        received: Vec<ReceivedFile>,
    ) -> Result<Vec<files::Model>, AppError> {
        if let Err(e) = validation::validate_app_name(app).and_then(|_| validation::validate_key(key)) {
            discard_files(&received).await;
            return Err(AppError::BadRequest(e.to_string()));
        }
        if received.is_empty() {
            return Err(AppError::BadRequest("No files uploaded".to_string()));
        }

        let dir = paths::storage_dir(&self.config.upload_root, app, key);
        if let Err(e) = fs_ops::ensure_directory(&dir).await {
            discard_files(&received).await;
            return Err(AppError::Storage(format!(
                "Failed to create directory: {e}"
            )));
        }

        let pipelines = received
            .into_iter()
            .map(|file| self.process_one(app, key, resize, file));
        let mut placed = Vec::new();
        for result in join_all(pipelines).await {
            placed.push(result?);
        }
        Ok(placed)
    }

    async fn process_one(
        &self,
        app: &str,
        key: &str,
        resize: Option<&str>,
        file: ReceivedFile,
    ) -> Result<files::Model, AppError> {
        let display_name = file
            .original_filename
            .clone()
            .unwrap_or_else(|| "unnamed".to_string());
        self.run_pipeline(app, key, resize, file)
            .await
            .map_err(|e| e.for_file(&display_name))
    }

    async fn run_pipeline(
        &self,
        app: &str,
        key: &str,
        resize: Option<&str>,
        file: ReceivedFile,
    ) -> Result<files::Model, AppError> {
        // RECEIVED -> VALIDATED
        let filename = file
            .original_filename
            .as_deref()
            .filter(|name| !name.is_empty());
        let mime = validation::resolve_mime(file.declared_mime.as_deref(), &file.header);
        let (filename, mime) = match (filename, mime) {
            (Some(filename), Some(mime)) if file.size > 0 => (filename.to_string(), mime),
            _ => {
                discard(&file.spool_path).await;
                return Err(AppError::BadRequest("Invalid file".to_string()));
            }
        };

        let ext = validation::extension_for_mime(&mime, &filename);
        let stored_name = format!("{}.{}", file.generated_id, ext);
        let destination =
            paths::storage_path(&self.config.upload_root, app, key, &stored_name);
        let dest_str = destination.to_string_lossy().to_string();
        let base = &self.config.public_base_url;
        let fileurl = format!("{base}/file/{app}/{key}/{stored_name}");
        let dataurl = format!("{base}/data/{app}/{key}/{stored_name}");

        // VALIDATED -> TRANSFORMED (images only, when options are supplied)
        let mut source = file.spool_path.clone();
        if let Some(raw) = resize
            && mime.starts_with("image/")
        {
            let opts = match ResizeOptions::parse(raw) {
                Ok(opts) => opts,
                Err(e) => {
                    discard(&file.spool_path).await;
                    return Err(AppError::Transform(e.to_string()));
                }
            };
            let transformed = file.spool_path.with_extension("resized");
            if let Err(e) = transform::resize_file(&file.spool_path, &transformed, opts).await {
                discard(&transformed).await;
                discard(&file.spool_path).await;
                return Err(AppError::Transform(e.to_string()));
            }
            // Transform succeeded; the original spool file is no longer needed.
            discard(&file.spool_path).await;
            source = transformed;
        }

        // -> LOCKED
        if !self.locks.try_acquire(&dest_str) {
            discard(&source).await;
            return Err(AppError::Conflict(
                "The file you requested is already being accessed. Please try again later."
                    .to_string(),
            ));
        }

        // LOCKED -> PLACED
        if let Err(e) = fs_ops::place_file(&source, &destination).await {
            discard(&source).await;
            self.locks.release(&dest_str);
            return Err(AppError::Storage(e.to_string()));
        }

        // PLACED -> RECORDED
        let record = files::Model {
            path: dest_str.clone(),
            app: app.to_string(),
            key: key.to_string(),
            id: file.generated_id,
            filename,
            fileurl,
            dataurl,
            filesize: file.size as i64,
            filetype: mime,
            downloads: 0,
        };
        if let Err(e) = records::upsert(&self.db, record.clone()).await {
            // The placed file must not outlive a failed record write.
            if let Err(rm) = fs::remove_file(&destination).await {
                warn!(
                    "failed to remove placed file {} after record failure: {}",
                    destination.display(),
                    rm
                );
            }
            self.locks.release(&dest_str);
            return Err(AppError::Database(e));
        }

        // RECORDED -> DONE
        self.locks.release(&dest_str);
        Ok(record)
    }
}

/// Removes every spooled file of a request that failed before its
/// pipelines started.
pub async fn discard_files(files: &[ReceivedFile]) {
    for file in files {
        discard(&file.spool_path).await;
    }
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!("failed to remove temp file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::prelude::*;
    use crate::infrastructure::database;
    use sea_orm::{Database, EntityTrait};
    use std::io::Cursor;
    use tempfile::TempDir;

    async fn setup(root: &TempDir) -> UploadService {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();
        let config = ServerConfig {
            upload_root: root.path().to_path_buf(),
            database_url: "sqlite::memory:".to_string(),
            public_base_url: "http://localhost:5001".to_string(),
            max_file_size: 1024 * 1024,
        };
        UploadService::new(db, PathLockRegistry::new(), config)
    }

    async fn spool_bytes(
        service: &UploadService,
        filename: &str,
        mime: &str,
        bytes: &[u8],
    ) -> ReceivedFile {
        service
            .spool(
                Some(filename.to_string()),
                Some(mime.to_string()),
                Cursor::new(bytes.to_vec()),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn pipeline_places_file_and_persists_record() {
        let root = TempDir::new().unwrap();
        let service = setup(&root).await;
        let file = spool_bytes(&service, "notes.txt", "text/plain", b"hello").await;
        let id = file.generated_id.clone();

        let placed = service
            .process_request("demo", "img", None, vec![file])
            .await
            .unwrap();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].filetype, "text/plain");
        assert_eq!(placed[0].filesize, 5);
        assert_eq!(placed[0].downloads, 0);

        let dest = root.path().join(format!("static/demo/img/{id}.txt"));
        assert_eq!(fs::read(&dest).await.unwrap(), b"hello");
        assert!(!service.locks.is_held(&dest.to_string_lossy()));

        let stored = Files::find().all(&service.db).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].path, dest.to_string_lossy());
    }

    #[tokio::test]
    async fn held_destination_is_rejected_without_touching_storage() {
        let root = TempDir::new().unwrap();
        let service = setup(&root).await;
        let file = spool_bytes(&service, "notes.txt", "text/plain", b"hello").await;
        let dest = root
            .path()
            .join(format!("static/demo/img/{}.txt", file.generated_id));
        assert!(service.locks.try_acquire(&dest.to_string_lossy()));

        let err = service
            .process_request("demo", "img", None, vec![file])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(fs::metadata(&dest).await.is_err());
        // the original holder still owns the lock
        assert!(service.locks.is_held(&dest.to_string_lossy()));
        // no spool leftovers
        assert!(staging_is_empty(root.path()).await);
    }

    #[tokio::test]
    async fn invalid_resize_options_abort_only_the_image_file() {
        let root = TempDir::new().unwrap();
        let service = setup(&root).await;

        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let mut png = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut png),
            image::ImageFormat::Png,
        )
        .unwrap();

        let image_file = spool_bytes(&service, "pic.png", "image/png", &png).await;
        let text_file = spool_bytes(&service, "notes.txt", "text/plain", b"hello").await;
        let text_id = text_file.generated_id.clone();

        let err = service
            .process_request("demo", "img", Some("not json"), vec![image_file, text_file])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transform(_)));

        // the text sibling was still placed and recorded
        let text_dest = root.path().join(format!("static/demo/img/{text_id}.txt"));
        assert!(fs::metadata(&text_dest).await.is_ok());
        let stored = Files::find().all(&service.db).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, text_id);

        // the image left neither temp nor final artifacts
        assert!(staging_is_empty(root.path()).await);
    }

    #[tokio::test]
    async fn resize_applies_to_image_uploads() {
        let root = TempDir::new().unwrap();
        let service = setup(&root).await;

        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let mut png = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut png),
            image::ImageFormat::Png,
        )
        .unwrap();
        let file = spool_bytes(&service, "pic.png", "image/png", &png).await;
        let id = file.generated_id.clone();

        let placed = service
            .process_request("demo", "img", Some(r#"{"width":4,"height":4}"#), vec![file])
            .await
            .unwrap();
        assert_eq!(placed.len(), 1);

        let dest = root.path().join(format!("static/demo/img/{id}.png"));
        let out = image::open(&dest).unwrap();
        assert_eq!(image::GenericImageView::dimensions(&out), (4, 4));
        assert!(staging_is_empty(root.path()).await);
    }

    #[tokio::test]
    async fn missing_required_fields_reject_the_file() {
        let root = TempDir::new().unwrap();
        let service = setup(&root).await;
        let file = spool_bytes(&service, "", "text/plain", b"hello").await;

        let err = service
            .process_request("demo", "img", None, vec![file])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(staging_is_empty(root.path()).await);
    }

    #[tokio::test]
    async fn oversize_spool_is_rejected_and_cleaned_up() {
        let root = TempDir::new().unwrap();
        let mut service = setup(&root).await;
        service.config.max_file_size = 16;

        let err = service
            .spool(
                Some("big.bin".to_string()),
                Some("application/octet-stream".to_string()),
                Cursor::new(vec![0u8; 64]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        assert!(staging_is_empty(root.path()).await);
    }

    #[tokio::test]
    async fn traversal_key_is_rejected_before_any_placement() {
        let root = TempDir::new().unwrap();
        let service = setup(&root).await;
        let file = spool_bytes(&service, "notes.txt", "text/plain", b"hello").await;

        let err = service
            .process_request("demo", "../escape", None, vec![file])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(staging_is_empty(root.path()).await);
    }

    async fn staging_is_empty(root: &Path) -> bool {
        let staging = paths::staging_dir(root);
        match fs::read_dir(&staging).await {
            Ok(mut entries) => entries.next_entry().await.unwrap().is_none(),
            Err(_) => true,
        }
    }
}
