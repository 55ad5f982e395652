//! Upload validation and job folder helpers.
//!
//! Accepted uploads are single images or `.zip` archives of images. Archive
//! entries that are not images, or whose paths escape the archive root, are
//! skipped rather than rejected.

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::error::UploadError;

/// Image extensions accepted for processing (lowercase, without the dot).
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff"];

/// Archive extension expanded into images.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Per-upload limits.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    /// Maximum bytes per uploaded file (and per archive entry)
    pub max_file_size: usize,
    /// Maximum images per job
    pub max_files: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_files: 500,
        }
    }
}

impl UploadLimits {
    /// Create limits from environment variables.
    pub fn from_env() -> Self {
        let max_file_size_mb: usize = std::env::var("MAX_FILE_SIZE_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);

        let max_files: usize = std::env::var("MAX_FILES_PER_JOB")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        Self {
            max_file_size: max_file_size_mb * 1024 * 1024,
            max_files,
        }
    }
}

/// Lowercased extension of a file name.
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether a file name carries an allowed image extension.
pub fn is_image_filename(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Reduce a client-supplied name to a safe basename.
///
/// Directory components are dropped and characters outside
/// `[A-Za-z0-9._-]` become `_`. Returns `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.len() > 255 {
        return None;
    }
    Some(cleaned.to_string())
}

/// An image accepted into a job.
#[derive(Debug, Clone)]
pub struct AcceptedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Accumulates the files of one upload request, enforcing limits as it goes.
#[derive(Debug)]
pub struct UploadBatch {
    limits: UploadLimits,
    images: Vec<AcceptedImage>,
    names: HashSet<String>,
    skipped: usize,
}

impl UploadBatch {
    pub fn new(limits: UploadLimits) -> Self {
        Self {
            limits,
            images: Vec::new(),
            names: HashSet::new(),
            skipped: 0,
        }
    }

    /// Number of images accepted so far.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Archive entries that were skipped.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Add one uploaded file. Returns how many images it contributed.
    pub fn add_file(&mut self, filename: &str, bytes: Vec<u8>) -> Result<usize, UploadError> {
        let name = sanitize_filename(filename)
            .ok_or_else(|| UploadError::UnsupportedType(filename.to_string()))?;

        if bytes.len() > self.limits.max_file_size {
            return Err(UploadError::TooLarge {
                filename: name,
                size: bytes.len(),
                max: self.limits.max_file_size,
            });
        }

        match extension(&name).as_deref() {
            Some(ARCHIVE_EXTENSION) => self.add_archive(&name, bytes),
            Some(ext) if ALLOWED_IMAGE_EXTENSIONS.contains(&ext) => {
                if image::guess_format(&bytes).is_err() {
                    return Err(UploadError::NotAnImage(name));
                }
                self.push(name, bytes)?;
                Ok(1)
            }
            _ => Err(UploadError::UnsupportedType(name)),
        }
    }

    /// Finish the batch. Fails when no image was accepted.
    pub fn into_images(self) -> Result<Vec<AcceptedImage>, UploadError> {
        if self.images.is_empty() {
            return Err(UploadError::Empty);
        }
        Ok(self.images)
    }

    fn push(&mut self, name: String, bytes: Vec<u8>) -> Result<(), UploadError> {
        if self.images.len() >= self.limits.max_files {
            return Err(UploadError::TooManyFiles {
                max: self.limits.max_files,
            });
        }

        let mut unique = name.clone();
        let mut n = 1;
        while self.names.contains(&unique) {
            unique = format!("{}_{}", n, name);
            n += 1;
        }

        self.names.insert(unique.clone());
        self.images.push(AcceptedImage {
            filename: unique,
            bytes,
        });
        Ok(())
    }

    fn add_archive(&mut self, archive_name: &str, bytes: Vec<u8>) -> Result<usize, UploadError> {
        let archive_err = |reason: String| UploadError::Archive {
            filename: archive_name.to_string(),
            reason,
        };

        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| archive_err(e.to_string()))?;

        let mut added = 0;
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| archive_err(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }

            let Some(path) = entry.enclosed_name() else {
                warn!(archive = %archive_name, entry = %entry.name(), "Skipping unsafe archive path");
                self.skipped += 1;
                continue;
            };

            let hidden = path
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with(['.', '_']));
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(sanitize_filename);

            let name = match name {
                Some(name) if !hidden && is_image_filename(&name) => name,
                _ => {
                    debug!(archive = %archive_name, entry = %entry.name(), "Skipping non-image entry");
                    self.skipped += 1;
                    continue;
                }
            };

            let max = self.limits.max_file_size;
            if entry.size() > max as u64 {
                return Err(UploadError::TooLarge {
                    filename: name,
                    size: entry.size() as usize,
                    max,
                });
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .take(max as u64 + 1)
                .read_to_end(&mut data)
                .map_err(|e| archive_err(e.to_string()))?;
            if data.len() > max {
                return Err(UploadError::TooLarge {
                    filename: name,
                    size: data.len(),
                    max,
                });
            }

            if image::guess_format(&data).is_err() {
                debug!(archive = %archive_name, entry = %name, "Skipping undecodable entry");
                self.skipped += 1;
                continue;
            }

            self.push(name, data)?;
            added += 1;
        }

        debug!(archive = %archive_name, added, skipped = self.skipped, "Archive expanded");
        Ok(added)
    }
}

/// Write accepted images into `dir`, creating it if needed.
pub async fn store_images(dir: &Path, images: &[AcceptedImage]) -> std::io::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut paths = Vec::with_capacity(images.len());
    for image in images {
        let path = dir.join(&image.filename);
        tokio::fs::write(&path, &image.bytes).await?;
        paths.push(path);
    }
    Ok(paths)
}

/// Image files directly inside `dir`, sorted by file name.
pub async fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut images = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_image_filename)
        {
            images.push(path);
        }
    }

    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// Zip every image in `dir` into an in-memory archive.
///
/// Entry names are the file names with `prefix` prepended.
pub async fn bundle_images(dir: &Path, prefix: &str) -> std::io::Result<Vec<u8>> {
    let mut files = Vec::new();
    for path in list_images(dir).await? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let name = format!("{}{}", prefix, name);
        files.push((name, tokio::fs::read(&path).await?));
    }

    tokio::task::spawn_blocking(move || write_archive(&files))
        .await
        .map_err(std::io::Error::other)?
}

fn write_archive(files: &[(String, Vec<u8>)]) -> std::io::Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in files {
        writer
            .start_file(name.as_str(), options)
            .map_err(std::io::Error::other)?;
        writer.write_all(data)?;
    }

    let cursor = writer.finish().map_err(std::io::Error::other)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extension_filter() {
        assert!(is_image_filename("a.JPG"));
        assert!(is_image_filename("a.tiff"));
        assert!(!is_image_filename("a.gif"));
        assert!(!is_image_filename("noext"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("C:\\photos\\my shoe.jpg").as_deref(), Some("my_shoe.jpg"));
        assert_eq!(sanitize_filename(".hidden.png").as_deref(), Some("hidden.png"));
        assert_eq!(sanitize_filename("dir/"), None);
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let mut batch = UploadBatch::new(UploadLimits::default());
        let err = batch.add_file("doc.pdf", b"%PDF".to_vec()).unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_rejects_disguised_file() {
        let mut batch = UploadBatch::new(UploadLimits::default());
        let err = batch.add_file("fake.png", b"not an image".to_vec()).unwrap_err();
        assert!(matches!(err, UploadError::NotAnImage(_)));
    }

    #[test]
    fn test_rejects_oversized_file() {
        let mut batch = UploadBatch::new(UploadLimits {
            max_file_size: 8,
            max_files: 10,
        });
        let err = batch.add_file("big.png", PNG.to_vec()).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { max: 8, .. }));
    }

    #[test]
    fn test_enforces_file_count() {
        let mut batch = UploadBatch::new(UploadLimits {
            max_file_size: 1024,
            max_files: 2,
        });
        batch.add_file("a.png", PNG.to_vec()).unwrap();
        batch.add_file("b.png", PNG.to_vec()).unwrap();
        let err = batch.add_file("c.png", PNG.to_vec()).unwrap_err();
        assert!(matches!(err, UploadError::TooManyFiles { max: 2 }));
    }

    #[test]
    fn test_duplicate_names_are_kept_apart() {
        let mut batch = UploadBatch::new(UploadLimits::default());
        batch.add_file("a.png", PNG.to_vec()).unwrap();
        batch.add_file("sub/a.png", PNG.to_vec()).unwrap();

        let names: Vec<String> = batch
            .into_images()
            .unwrap()
            .into_iter()
            .map(|i| i.filename)
            .collect();
        assert_eq!(names, vec!["a.png", "1_a.png"]);
    }

    #[test]
    fn test_empty_batch() {
        let batch = UploadBatch::new(UploadLimits::default());
        assert!(matches!(batch.into_images(), Err(UploadError::Empty)));
    }

    #[test]
    fn test_zip_expansion_skips_unsafe_entries() {
        let archive = zip_of(&[
            ("products/one.png", PNG),
            ("two.jpg", &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
            ("notes.txt", b"hello"),
            ("../escape.png", PNG),
            ("__MACOSX/._one.png", PNG),
            ("broken.png", b"nope"),
        ]);

        let mut batch = UploadBatch::new(UploadLimits::default());
        let added = batch.add_file("batch.zip", archive).unwrap();
        assert_eq!(added, 2);
        assert_eq!(batch.skipped(), 4);

        let names: Vec<String> = batch
            .into_images()
            .unwrap()
            .into_iter()
            .map(|i| i.filename)
            .collect();
        assert_eq!(names, vec!["one.png", "two.jpg"]);
    }

    #[test]
    fn test_corrupt_zip() {
        let mut batch = UploadBatch::new(UploadLimits::default());
        let err = batch.add_file("bad.zip", b"PK-not-really".to_vec()).unwrap_err();
        assert!(matches!(err, UploadError::Archive { .. }));
    }

    #[tokio::test]
    async fn test_store_and_list_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let job_dir = dir.path().join("job-1");

        let images = vec![
            AcceptedImage {
                filename: "b.png".into(),
                bytes: PNG.to_vec(),
            },
            AcceptedImage {
                filename: "a.png".into(),
                bytes: PNG.to_vec(),
            },
        ];
        store_images(&job_dir, &images).await.unwrap();
        tokio::fs::write(job_dir.join("readme.txt"), b"x").await.unwrap();

        let listed = list_images(&job_dir).await.unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[tokio::test]
    async fn test_bundle_images() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b_processed.png"), PNG).await.unwrap();
        tokio::fs::write(dir.path().join("a_processed.png"), PNG).await.unwrap();
        tokio::fs::write(dir.path().join("log.txt"), b"x").await.unwrap();

        let bytes = bundle_images(dir.path(), "masterpost_amazon_").await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"masterpost_amazon_a_processed.png".to_string()));

        let mut data = Vec::new();
        archive
            .by_name("masterpost_amazon_b_processed.png")
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, PNG);
    }
}
