use std::env;
use std::path::PathBuf;

/// Server configuration for the upload backend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root of the storage tree; files land under `<root>/static/...`
    /// and uploads are spooled under `<root>/staging`. Always absolute.
    pub upload_root: PathBuf,

    /// Database connection string (default: SQLite file next to the root)
    pub database_url: String,

    /// Base URL used to build public file/data URLs
    pub public_base_url: String,

    /// Maximum file size in bytes (default: 256 MB)
    pub max_file_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upload_root: absolute(PathBuf::from("./uploads")),
            database_url: "sqlite://files.db?mode=rwc".to_string(),
            public_base_url: "http://localhost:5001".to_string(),
            max_file_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_root: env::var("UPLOAD_ROOT")
                .map(|v| absolute(PathBuf::from(v)))
                .unwrap_or(default.upload_root),

            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.public_base_url),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),
        }
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}
