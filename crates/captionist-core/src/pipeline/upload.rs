//! Upload validation and storage.

use std::path::{Path, PathBuf};

use crate::error::UploadError;
use crate::types::UploadedFile;

/// Accepted image extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// URL prefix under which stored uploads are served.
pub const UPLOAD_URL_PREFIX: &str = "/uploads";

/// Check that an upload is present and has an allowed extension.
///
/// Runs before anything touches the disk or a model.
pub fn validate(file: Option<&UploadedFile>) -> Result<&UploadedFile, UploadError> {
    let file = file.ok_or(UploadError::NoFilePart)?;

    if file.file_name.is_empty() {
        return Err(UploadError::NoSelectedFile);
    }

    if !is_allowed(&file.file_name) {
        return Err(UploadError::InvalidFileType {
            file_name: file.file_name.clone(),
        });
    }

    Ok(file)
}

/// Whether `file_name` ends in one of [`ALLOWED_EXTENSIONS`].
pub fn is_allowed(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Reduce a client filename to a safe basename.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_`, and leading dots are stripped. Falls back to `upload` if
/// nothing is left.
pub fn sanitize_filename(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Writes validated uploads into a single directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

/// A file written by [`UploadStore::save`].
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Location on disk
    pub path: PathBuf,
    /// URL the page uses to show the image
    pub url: String,
}

impl UploadStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| UploadError::Storage {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the upload under its sanitized name, replacing any previous file.
    pub async fn save(&self, file: &UploadedFile) -> Result<StoredUpload, UploadError> {
        let stored_name = sanitize_filename(&file.file_name);
        let path = self.dir.join(&stored_name);

        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|source| UploadError::Storage {
                path: path.clone(),
                source,
            })?;

        tracing::debug!("Stored upload {:?} ({} bytes)", path, file.bytes.len());

        Ok(StoredUpload {
            path,
            url: format!("{UPLOAD_URL_PREFIX}/{stored_name}"),
        })
    }
}
