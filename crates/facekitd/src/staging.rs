//! Filesystem staging area: scratch uploads in, result images out.
//!
//! Scratch paths are derived from the sanitized client filename only, so two
//! concurrent requests with the same name share a scratch file (last writer
//! wins) and, for find-face, a result file.

use crate::errors::{ApiError, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Extensions accepted by every endpoint.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// One file part of a multipart request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: axum::body::Bytes,
}

/// Reduce a client-supplied filename to something safe to join onto a directory.
///
/// Keeps ASCII letters, digits, `.`, `_` and `-`; path separators and
/// whitespace become `_`; leading and trailing dots/underscores are trimmed.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars().filter(char::is_ascii) {
        if ch == '/' || ch == '\\' || ch.is_ascii_whitespace() {
            pending_sep = true;
            continue;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

fn has_allowed_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Require an allow-listed extension on the client's filename, then sanitize it.
///
/// The sanitized name must still carry an allowed extension, so stripping
/// cannot turn a rejected name into an accepted one or vice versa.
pub fn validate_upload(name: &str) -> Result<String> {
    if !has_allowed_extension(name) {
        return Err(ApiError::InvalidFileFormat);
    }
    let sanitized = sanitize_filename(name).ok_or(ApiError::InvalidFileFormat)?;
    if has_allowed_extension(&sanitized) { Ok(sanitized) } else { Err(ApiError::InvalidFileFormat) }
}

/// Name of the background-removal result for an upload: everything before the
/// first dot, then `-rm.png`.
pub fn removed_background_name(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or(filename);
    format!("{stem}-rm.png")
}

/// Scratch name for the second image of a comparison, kept apart from the
/// first when both uploads carry the same name.
pub fn second_scratch_name(first: &str, second: &str) -> String {
    if first == second { format!("2-{second}") } else { second.to_string() }
}

/// The scratch and results directories.
#[derive(Debug, Clone)]
pub struct Staging {
    uploads: PathBuf,
    results: PathBuf,
}

impl Staging {
    /// Create both directories if needed. Paths are made absolute so that
    /// result paths handed to clients are absolute too.
    pub async fn create(uploads: &Path, results: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(uploads).await?;
        tokio::fs::create_dir_all(results).await?;
        let staging = Self {
            uploads: tokio::fs::canonicalize(uploads).await?,
            results: tokio::fs::canonicalize(results).await?,
        };
        tracing::info!(
            uploads = %staging.uploads.display(),
            results = %staging.results.display(),
            "staging directories ready"
        );
        Ok(staging)
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads
    }

    pub fn results_dir(&self) -> &Path {
        &self.results
    }

    /// Write an upload to the scratch directory under its sanitized name.
    pub async fn stage(&self, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.uploads.join(filename);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            self.discard(&path).await;
            return Err(e);
        }
        tracing::debug!(path = %path.display(), size = bytes.len(), "upload staged");
        Ok(path)
    }

    /// Remove a staged file. Failures are logged, never returned.
    pub async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "scratch file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
        }
    }

    /// Every file currently in the scratch directory.
    pub async fn snapshot(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.uploads).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    /// Remove each of `files`.
    pub async fn sweep(&self, files: &[PathBuf]) {
        for file in files {
            self.discard(file).await;
        }
        tracing::debug!(count = files.len(), "scratch directory swept");
    }

    /// Encode `image` into the results directory, format chosen by extension.
    pub async fn write_result(&self, filename: &str, image: DynamicImage) -> Result<PathBuf> {
        let path = self.results.join(filename);
        let format = ImageFormat::from_path(&path)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            let image = match format {
                // JPEG has no alpha channel.
                ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
                _ => image,
            };
            image.save_with_format(&target, format)
        })
        .await??;

        tracing::info!(path = %path.display(), "result written");
        Ok(path)
    }

    /// Write a background-removal result as PNG.
    pub async fn write_png(&self, filename: &str, image: RgbaImage) -> Result<PathBuf> {
        let path = self.results.join(filename);
        let target = path.clone();
        tokio::task::spawn_blocking(move || image.save_with_format(&target, ImageFormat::Png)).await??;

        tracing::info!(path = %path.display(), "result written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("etc_passwd"));
        assert_eq!(sanitize_filename("..\\..\\boot.ini").as_deref(), Some("boot.ini"));
        assert_eq!(sanitize_filename("/abs/path/face.png").as_deref(), Some("abs_path_face.png"));
    }

    #[test]
    fn test_sanitize_whitespace_and_unicode() {
        assert_eq!(sanitize_filename("my  photo.JPG").as_deref(), Some("my_photo.JPG"));
        assert_eq!(sanitize_filename("fâce.png").as_deref(), Some("fce.png"));
        assert_eq!(sanitize_filename("a$b%c.webp").as_deref(), Some("abc.webp"));
    }

    #[test]
    fn test_sanitize_empty_results() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("../.."), None);
        assert_eq!(sanitize_filename("..."), None);
    }

    #[test]
    fn test_validate_case_insensitive() {
        assert_eq!(validate_upload("Face.PNG").unwrap(), "Face.PNG");
        assert_eq!(validate_upload("x.jpeg").unwrap(), "x.jpeg");
        assert_eq!(validate_upload("x.WebP").unwrap(), "x.WebP");
    }

    #[test]
    fn test_validate_rejects_other_extensions() {
        for name in ["face.gif", "face.bmp", "face", "png", "face.png.exe", "facepng", ""] {
            assert!(
                matches!(validate_upload(name), Err(ApiError::InvalidFileFormat)),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_removed_background_name() {
        assert_eq!(removed_background_name("face.jpg"), "face-rm.png");
        assert_eq!(removed_background_name("face.PNG"), "face-rm.png");
        assert_eq!(removed_background_name("group.photo.webp"), "group-rm.png");
    }

    #[test]
    fn test_validate_checks_client_name_before_sanitizing() {
        for name in ["face.p\u{e9}ng", "face.png/", "face.png\\", "face.png ", "../.png", ".png"] {
            assert!(
                matches!(validate_upload(name), Err(ApiError::InvalidFileFormat)),
                "{name:?} should be rejected"
            );
        }
        assert_eq!(validate_upload("../../evil.png").unwrap(), "evil.png");
    }

    #[test]
    fn test_second_scratch_name_avoids_collision() {
        assert_eq!(second_scratch_name("photo.png", "photo.png"), "2-photo.png");
        assert_eq!(second_scratch_name("alice.png", "bob.png"), "bob.png");
    }

    #[tokio::test]
    async fn test_stage_discard_and_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::create(&dir.path().join("uploads"), &dir.path().join("results"))
            .await
            .unwrap();
        assert!(staging.results_dir().is_absolute());

        let a = staging.stage("a.png", b"aaa").await.unwrap();
        let b = staging.stage("b.png", b"bbb").await.unwrap();
        assert_eq!(std::fs::read(&a).unwrap(), b"aaa");

        staging.discard(&a).await;
        assert!(!a.exists());
        // Discarding twice is harmless.
        staging.discard(&a).await;

        let snapshot = staging.snapshot().await.unwrap();
        assert_eq!(snapshot, vec![b.clone()]);
        staging.sweep(&snapshot).await;
        assert!(staging.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_result_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::create(&dir.path().join("u"), &dir.path().join("r")).await.unwrap();
        let image = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));

        let jpg = staging.write_result("face.jpg", image.clone()).await.unwrap();
        assert_eq!(image::ImageFormat::from_path(&jpg).unwrap(), ImageFormat::Jpeg);
        assert!(image::open(&jpg).is_ok());

        let png = staging.write_png("face-rm.png", RgbaImage::new(2, 2)).await.unwrap();
        assert_eq!(image::open(&png).unwrap().color(), image::ColorType::Rgba8);
    }
}
