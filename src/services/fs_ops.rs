use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PlaceError {
    #[error("source file missing at {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Ensures the directory chain exists. Checks for presence first and
/// creates the full chain if absent; the "already exists" race between
/// concurrent callers is not an error.
pub async fn ensure_directory(path: &Path) -> std::io::Result<()> {
    match fs::metadata(path).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => match fs::create_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    }
}

/// Moves a fully prepared temp file to its final destination.
///
/// The primary strategy is a same-filesystem atomic rename. When the
/// rename crosses a storage boundary it falls back to copy + delete,
/// which is not atomic; a failure to remove the source after a
/// successful copy is logged and swallowed since the destination is
/// already usable.
pub async fn place_file(temp: &Path, dest: &Path) -> Result<PathBuf, PlaceError> {
    match fs::metadata(temp).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PlaceError::SourceMissing {
                path: temp.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    match fs::rename(temp, dest).await {
        Ok(()) => Ok(dest.to_path_buf()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            copy_across_devices(temp, dest).await?;
            Ok(dest.to_path_buf())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn copy_across_devices(temp: &Path, dest: &Path) -> std::io::Result<()> {
    fs::copy(temp, dest).await?;
    if let Err(e) = fs::remove_file(temp).await {
        warn!(
            "placed {} but failed to remove source {}: {}",
            dest.display(),
            temp.display(),
            e
        );
    }
    Ok(())
}
