use anyhow::{Result, anyhow};
use std::path::Path;

/// Validates an application name: a single path segment, no traversal.
pub fn validate_app_name(app: &str) -> Result<()> {
    if app.is_empty() {
        return Err(anyhow!("No app specified"));
    }
    validate_segment(app)
}

/// Validates a namespace key. Keys may span multiple `/`-separated
/// segments but every segment must be a plain directory name.
pub fn validate_key(key: &str) -> Result<()> {
    if key.split('/').all(|s| s.is_empty()) {
        return Err(anyhow!("No key specified"));
    }
    for segment in key.split('/').filter(|s| !s.is_empty()) {
        validate_segment(segment)?;
    }
    Ok(())
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment == "." || segment == ".." {
        return Err(anyhow!(
            "path traversal segment '{}' is not allowed",
            segment
        ));
    }
    if segment.contains('/') || segment.contains('\\') {
        return Err(anyhow!("separator in path segment '{}'", segment));
    }
    if segment.chars().any(|c| c.is_control()) {
        return Err(anyhow!("control character in path segment"));
    }
    Ok(())
}

/// Resolves the effective mime type of an upload. Trusts the declared
/// content type unless it is absent or the generic octet-stream, in
/// which case the spooled header bytes are sniffed.
pub fn resolve_mime(declared: Option<&str>, header: &[u8]) -> Option<String> {
    if let Some(declared) = declared {
        let normalized = declared
            .parse::<mime::Mime>()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|_| declared.trim().to_lowercase());
        if normalized != mime::APPLICATION_OCTET_STREAM.essence_str() {
            return Some(normalized);
        }
    }
    if let Some(kind) = infer::get(header) {
        return Some(kind.mime_type().to_string());
    }
    declared.map(|d| d.trim().to_lowercase())
}

/// Maps a mime type to the extension used for the stored filename,
/// falling back to the original filename's extension, then to `bin`.
pub fn extension_for_mime(mime_type: &str, original_filename: &str) -> String {
    let from_table = match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "text/css" => Some("css"),
        "text/csv" => Some("csv"),
        "application/json" => Some("json"),
        "application/pdf" => Some("pdf"),
        "application/zip" => Some("zip"),
        "application/gzip" => Some("gz"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "audio/mpeg" => Some("mp3"),
        "audio/wav" => Some("wav"),
        _ => None,
    };
    if let Some(ext) = from_table {
        return ext.to_string();
    }

    Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_rejects_traversal_and_separators() {
        assert!(validate_app_name("demo").is_ok());
        assert!(validate_app_name("").is_err());
        assert!(validate_app_name("..").is_err());
        assert!(validate_app_name("a/b").is_err());
    }

    #[test]
    fn key_allows_nesting_but_not_traversal() {
        assert!(validate_key("img").is_ok());
        assert!(validate_key("avatars/2024").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("a/../b").is_err());
    }

    #[test]
    fn declared_mime_wins_when_specific() {
        assert_eq!(
            resolve_mime(Some("image/jpeg; charset=binary"), b""),
            Some("image/jpeg".to_string())
        );
    }

    #[test]
    fn generic_mime_falls_back_to_sniffing() {
        // PNG magic bytes
        let header = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        assert_eq!(
            resolve_mime(Some("application/octet-stream"), &header),
            Some("image/png".to_string())
        );
        assert_eq!(resolve_mime(None, &header), Some("image/png".to_string()));
    }

    #[test]
    fn unknown_bytes_keep_the_declared_type() {
        assert_eq!(
            resolve_mime(Some("application/octet-stream"), b"just text"),
            Some("application/octet-stream".to_string())
        );
        assert_eq!(resolve_mime(None, b"just text"), None);
    }

    #[test]
    fn extension_prefers_table_then_filename() {
        assert_eq!(extension_for_mime("image/jpeg", "photo.jpeg"), "jpg");
        assert_eq!(
            extension_for_mime("application/x-custom", "data.XYZ"),
            "xyz"
        );
        assert_eq!(extension_for_mime("application/x-custom", "data"), "bin");
    }
}
