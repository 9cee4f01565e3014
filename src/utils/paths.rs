use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::path::{Path, PathBuf};

/// Characters percent-encoded inside a stored path segment. The encoded
/// destination path is the join key between the metadata store and the
/// filesystem, so upload and retrieval must build it identically.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b'?')
    .add(b'#')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'\\');

pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Directory holding every file for one application + key scope:
/// `<root>/static/<app>/<key>`. The key may span multiple segments.
pub fn storage_dir(root: &Path, app: &str, key: &str) -> PathBuf {
    let mut dir = root.join("static").join(encode_segment(app));
    for segment in key.split('/').filter(|s| !s.is_empty()) {
        dir.push(encode_segment(segment));
    }
    dir
}

/// Final destination for one stored file:
/// `<root>/static/<app>/<key>/<id>.<ext>`.
pub fn storage_path(root: &Path, app: &str, key: &str, file_name: &str) -> PathBuf {
    storage_dir(root, app, key).join(encode_segment(file_name))
}

/// Staging area uploads are spooled into before placement. Kept under the
/// upload root so placement is usually a same-device rename.
pub fn staging_dir(root: &Path) -> PathBuf {
    root.join("staging")
}
