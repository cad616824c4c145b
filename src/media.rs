//! Blob storage for uploaded files.
//!
//! Uploads are written under `<media_dir>/task_files/` with a unique,
//! sanitized file name. The bytes are never inspected or transformed.

use crate::db::files::StoredBlob;
use anyhow::{Result, anyhow};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Subdirectory of the media directory that holds task uploads.
pub const UPLOAD_DIR: &str = "task_files";

/// URL prefix under which stored blobs are served.
pub const MEDIA_URL: &str = "/media/";

const MAX_NAME_CHARS: usize = 100;

/// Public URL of a blob stored at `path` (relative to the media directory).
pub fn media_url(path: &str) -> String {
    format!("{}{}", MEDIA_URL, path)
}

/// Reduce a client-supplied file name to a safe single path segment.
pub fn sanitize_file_name(name: &str) -> String {
    // Browsers on Windows may send a full path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let safe: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim_start_matches('.');

    if safe.is_empty() {
        "upload".to_string()
    } else {
        safe.chars().take(MAX_NAME_CHARS).collect()
    }
}

/// Media directory handle.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `bytes` as a new upload and return its metadata.
    pub fn save(&self, original_name: &str, content_type: &str, bytes: &[u8]) -> Result<StoredBlob> {
        let dir = self.root.join(UPLOAD_DIR);
        std::fs::create_dir_all(&dir)?;

        let file_name = format!(
            "{}_{}",
            Uuid::now_v7().simple(),
            sanitize_file_name(original_name)
        );
        std::fs::write(dir.join(&file_name), bytes)?;

        Ok(StoredBlob {
            path: format!("{}/{}", UPLOAD_DIR, file_name),
            name: original_name.to_string(),
            size: bytes.len() as i64,
            content_type: content_type.to_string(),
        })
    }

    /// Read the bytes stored at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.resolve(path)?)?)
    }

    /// Remove the blob at `path`. Returns `false` if it was already gone.
    pub fn remove(&self, path: &str) -> Result<bool> {
        match std::fs::remove_file(self.resolve(path)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove several blobs, logging failures instead of returning them.
    pub fn remove_all<'a>(&self, paths: impl IntoIterator<Item = &'a String>) {
        for path in paths {
            if let Err(e) = self.remove(path) {
                tracing::warn!(path = %path, "Failed to remove stored file: {:#}", e);
            }
        }
    }

    /// Map a stored relative path into the media directory, refusing
    /// anything that could escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !confined || path.is_empty() {
            return Err(anyhow!("Invalid media path: {}", path));
        }
        Ok(self.root.join(relative))
    }
}
