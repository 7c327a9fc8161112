use chrono::{DateTime, Local};
use reqwest::Url;
use std::path::Path;

/// Read-only metadata snapshot of a single path.
///
/// Recomputed on every query, never cached.
#[derive(Debug, Clone)]
pub struct FileAttribute {
    pub file_name: String,
    pub path_extension: String,
    pub file_size: u64,
    pub creation_date: DateTime<Local>,
    pub modification_date: DateTime<Local>,
}

impl FileAttribute {
    /// Build the attribute record for a path, or `None` when the path cannot
    /// be inspected.
    pub fn from_path(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        let modified = metadata.modified().ok()?;
        // Platforms without birth-time support fall back to the mtime.
        let created = metadata.created().unwrap_or(modified);

        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let path_extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();

        Some(Self {
            file_name,
            path_extension,
            file_size: metadata.len(),
            creation_date: DateTime::<Local>::from(created),
            modification_date: DateTime::<Local>::from(modified),
        })
    }

    /// Build the attribute record for a file-scheme URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        if url.scheme() != "file" {
            return None;
        }

        let path = url.to_file_path().ok()?;
        Self::from_path(&path)
    }
}
