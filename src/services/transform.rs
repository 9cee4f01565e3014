use image::GenericImageView;
use image::imageops::FilterType;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to parse resize options: {0}")]
    Options(String),

    #[error("Failed to process the file: {0}")]
    Processing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Caller-supplied resize parameters, passed as a JSON object in the
/// `resize` query parameter, e.g. `{"width":256}`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ResizeOptions {
    pub fn parse(raw: &str) -> Result<Self, TransformError> {
        let opts: ResizeOptions =
            serde_json::from_str(raw).map_err(|e| TransformError::Options(e.to_string()))?;
        match (opts.width, opts.height) {
            (None, None) => Err(TransformError::Options(
                "at least one of width/height is required".to_string(),
            )),
            (w, h) if w == Some(0) || h == Some(0) => Err(TransformError::Options(
                "dimensions must be non-zero".to_string(),
            )),
            _ => Ok(opts),
        }
    }
}

/// Resizes the image at `src` into `dst`, keeping the source format.
/// `src` is left untouched; on failure nothing usable is left at `dst`.
pub async fn resize_file(
    src: &Path,
    dst: &Path,
    opts: ResizeOptions,
) -> Result<(), TransformError> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let reader = image::io::Reader::open(&src)?
            .with_guessed_format()
            .map_err(TransformError::Io)?;
        let format = reader
            .format()
            .ok_or_else(|| TransformError::Processing("unrecognized image format".to_string()))?;
        let img = reader
            .decode()
            .map_err(|e| TransformError::Processing(e.to_string()))?;

        let (orig_w, orig_h) = img.dimensions();
        let (w, h) = match (opts.width, opts.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, scaled(orig_h, w, orig_w)),
            (None, Some(h)) => (scaled(orig_w, h, orig_h), h),
            (None, None) => unreachable!("rejected by ResizeOptions::parse"),
        };

        let resized = img.resize_exact(w, h, FilterType::Lanczos3);
        resized
            .save_with_format(&dst, format)
            .map_err(|e| TransformError::Processing(e.to_string()))
    })
    .await
    .map_err(|e| TransformError::Processing(format!("resize task failed: {e}")))?
}

fn scaled(other: u32, target: u32, reference: u32) -> u32 {
    ((other as f64) * (target as f64) / (reference as f64))
        .round()
        .max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
        img.save_with_format(path, image::ImageFormat::Png).unwrap();
    }

    #[test]
    fn parse_accepts_width_only() {
        let opts = ResizeOptions::parse(r#"{"width":128}"#).unwrap();
        assert_eq!(opts.width, Some(128));
        assert_eq!(opts.height, None);
    }

    #[test]
    fn parse_rejects_malformed_json_and_empty_options() {
        assert!(matches!(
            ResizeOptions::parse("not json"),
            Err(TransformError::Options(_))
        ));
        assert!(matches!(
            ResizeOptions::parse("{}"),
            Err(TransformError::Options(_))
        ));
        assert!(matches!(
            ResizeOptions::parse(r#"{"width":0}"#),
            Err(TransformError::Options(_))
        ));
    }

    #[tokio::test]
    async fn resize_produces_requested_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        let dst = dir.path().join("out.png");
        write_png(&src, 8, 4);

        let opts = ResizeOptions::parse(r#"{"width":4,"height":2}"#).unwrap();
        resize_file(&src, &dst, opts).await.unwrap();

        let out = image::open(&dst).unwrap();
        assert_eq!(out.dimensions(), (4, 2));
        // source untouched
        assert_eq!(image::open(&src).unwrap().dimensions(), (8, 4));
    }

    #[tokio::test]
    async fn single_dimension_preserves_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        let dst = dir.path().join("out.png");
        write_png(&src, 8, 4);

        let opts = ResizeOptions::parse(r#"{"width":4}"#).unwrap();
        resize_file(&src, &dst, opts).await.unwrap();
        assert_eq!(image::open(&dst).unwrap().dimensions(), (4, 2));
    }

    #[tokio::test]
    async fn non_image_input_fails_without_touching_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.txt");
        let dst = dir.path().join("out.txt");
        tokio::fs::write(&src, b"definitely not an image")
            .await
            .unwrap();

        let opts = ResizeOptions::parse(r#"{"width":4}"#).unwrap();
        let err = resize_file(&src, &dst, opts).await.unwrap_err();
        assert!(matches!(err, TransformError::Processing(_)));
        assert!(tokio::fs::metadata(&src).await.is_ok());
    }
}
