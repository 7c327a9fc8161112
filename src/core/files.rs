//! Sandbox-scoped file-system service.
//!
//! `FileController` is logically stateless: it holds only the resolved sandbox
//! directory paths and forwards every operation to the platform. Construct one
//! instance and pass it where needed.
//!
//! Error reporting follows three idioms: boolean success for existence,
//! create, remove and the simple copy/move; `Option` for readers and metadata;
//! a structured error only in the async copy/move terminal event.

use crate::core::attribute::FileAttribute;
use crate::core::transfer::{self, TransferEvent};
use crate::error::{FerryError, Result};
use crate::utils::paths;
use chrono::{DateTime, Local};
use log::{debug, warn};
use reqwest::Url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct FileController {
    application_dir: PathBuf,
    document_dir: PathBuf,
    caches_dir: PathBuf,
    library_dir: PathBuf,
    temporary_dir: PathBuf,
}

impl FileController {
    /// Resolve the five sandbox directories from the host platform.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().ok_or(FerryError::HomeDirectoryNotFound)?;

        let application_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| home.clone());
        let document_dir = dirs::document_dir().unwrap_or_else(|| home.join("Documents"));
        let caches_dir = dirs::cache_dir().unwrap_or_else(|| home.join(".cache"));
        let library_dir = dirs::data_dir().unwrap_or_else(|| home.join(".local").join("share"));
        let temporary_dir = std::env::temp_dir();

        Ok(Self {
            application_dir,
            document_dir,
            caches_dir,
            library_dir,
            temporary_dir,
        })
    }

    /// Scope all five sandbox directories under an arbitrary root.
    ///
    /// Intended for tests and embedding; the subdirectories are created on
    /// demand by the write-side operations.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();

        Self {
            application_dir: root.join("Application"),
            document_dir: root.join("Documents"),
            caches_dir: root.join("Caches"),
            library_dir: root.join("Library"),
            temporary_dir: root.join("tmp"),
        }
    }

    /// Check whether a file name is legal as a single path component.
    pub fn check_file_name_legally(&self, file_name: &str) -> bool {
        paths::check_file_name_legally(file_name)
    }

    // Existence

    pub fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Existence check by URL. The URL must use the `file` scheme; anything
    /// else is reported as not existing.
    pub fn file_exists_at_url(&self, url: &Url) -> bool {
        if url.scheme() != "file" {
            return false;
        }

        url.to_file_path()
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    // Free space

    /// Free space in bytes on the volume holding the document directory.
    ///
    /// Returns 0 when the query fails.
    pub fn storage_space(&self) -> u64 {
        let probe = if self.document_dir.exists() {
            self.document_dir.as_path()
        } else {
            self.temporary_dir.as_path()
        };

        match fs2::available_space(probe) {
            Ok(space) => space,
            Err(error) => {
                warn!("free space query failed for {}: {}", probe.display(), error);
                0
            }
        }
    }

    /// Check whether the free space covers the size of the file at `path`.
    pub fn space_enough_for_file(&self, path: &Path) -> bool {
        match std::fs::metadata(path) {
            Ok(metadata) => self.space_enough_for_size(metadata.len()),
            Err(_) => false,
        }
    }

    pub fn space_enough_for_size(&self, size: u64) -> bool {
        size <= self.storage_space()
    }

    // Path builders

    pub fn application_path(&self) -> PathBuf {
        self.application_dir.clone()
    }

    pub fn application_path_with_file_name(&self, file_name: &str) -> PathBuf {
        paths::join_file_name(&self.application_dir, file_name)
    }

    pub fn document_path(&self) -> PathBuf {
        self.document_dir.clone()
    }

    pub fn document_path_with_file_name(&self, file_name: &str) -> PathBuf {
        paths::join_file_name(&self.document_dir, file_name)
    }

    pub fn caches_path(&self) -> PathBuf {
        self.caches_dir.clone()
    }

    pub fn caches_path_with_file_name(&self, file_name: &str) -> PathBuf {
        paths::join_file_name(&self.caches_dir, file_name)
    }

    pub fn library_path(&self) -> PathBuf {
        self.library_dir.clone()
    }

    pub fn library_path_with_file_name(&self, file_name: &str) -> PathBuf {
        paths::join_file_name(&self.library_dir, file_name)
    }

    pub fn temporary_path(&self) -> PathBuf {
        self.temporary_dir.clone()
    }

    pub fn temporary_path_with_file_name(&self, file_name: &str) -> PathBuf {
        paths::join_file_name(&self.temporary_dir, file_name)
    }

    // Read

    /// Read a text file. `None` when the file is missing or not UTF-8.
    pub fn read_string(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    /// Read a JSON array-of-strings document. `None` when the file is missing
    /// or does not parse into that shape.
    pub fn read_array(&self, path: &Path) -> Option<Vec<String>> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Read a JSON string-to-string object document. `None` when the file is
    /// missing or does not parse into that shape.
    pub fn read_dictionary(&self, path: &Path) -> Option<HashMap<String, String>> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    // Write

    /// Write a string to a file, creating it if absent and overwriting it
    /// otherwise. No atomicity beyond the platform write call.
    pub fn write_string(&self, string: &str, path: &Path) -> bool {
        self.write_bytes(string.as_bytes(), path)
    }

    pub fn write_array(&self, array: &[String], path: &Path) -> bool {
        match serde_json::to_string_pretty(array) {
            Ok(content) => self.write_bytes(content.as_bytes(), path),
            Err(error) => {
                warn!("array serialization failed for {}: {}", path.display(), error);
                false
            }
        }
    }

    pub fn write_dictionary(&self, dictionary: &HashMap<String, String>, path: &Path) -> bool {
        match serde_json::to_string_pretty(dictionary) {
            Ok(content) => self.write_bytes(content.as_bytes(), path),
            Err(error) => {
                warn!(
                    "dictionary serialization failed for {}: {}",
                    path.display(),
                    error
                );
                false
            }
        }
    }

    fn write_bytes(&self, bytes: &[u8], path: &Path) -> bool {
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        match std::fs::write(path, bytes) {
            Ok(()) => true,
            Err(error) => {
                debug!("write failed for {}: {}", path.display(), error);
                false
            }
        }
    }

    // Create

    /// Create a directory (and missing parents). Creating an existing
    /// directory is treated as success.
    pub fn create_directory(&self, path: &Path) -> bool {
        match std::fs::create_dir_all(path) {
            Ok(()) => true,
            Err(error) => {
                debug!("create directory failed for {}: {}", path.display(), error);
                false
            }
        }
    }

    pub fn create_directory_under_document(&self, directory_name: &str) -> bool {
        if !self.check_file_name_legally(directory_name) {
            return false;
        }
        self.create_directory(&self.document_path_with_file_name(directory_name))
    }

    pub fn create_directory_under_caches(&self, directory_name: &str) -> bool {
        if !self.check_file_name_legally(directory_name) {
            return false;
        }
        self.create_directory(&self.caches_path_with_file_name(directory_name))
    }

    /// Create an empty file, truncating an existing one.
    pub fn create_file(&self, path: &Path) -> bool {
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        match std::fs::File::create(path) {
            Ok(_) => true,
            Err(error) => {
                debug!("create file failed for {}: {}", path.display(), error);
                false
            }
        }
    }

    /// Create an empty file under the document directory, optionally inside a
    /// named subdirectory.
    pub fn create_file_under_document(&self, file_name: &str, directory: Option<&str>) -> bool {
        if !self.check_file_name_legally(file_name) {
            return false;
        }

        let path = match directory {
            Some(directory) => {
                if !self.check_file_name_legally(directory) {
                    return false;
                }
                self.document_path_with_file_name(directory).join(file_name)
            }
            None => self.document_path_with_file_name(file_name),
        };

        self.create_file(&path)
    }

    // List

    /// List the names (not full paths) inside a named document subdirectory.
    pub fn files_of_document_directory(&self, directory_name: &str) -> Vec<String> {
        self.files_at_path(&self.document_path_with_file_name(directory_name))
    }

    /// List the names (not full paths) inside a directory, sorted. Empty when
    /// the directory cannot be read.
    pub fn files_at_path(&self, path: &Path) -> Vec<String> {
        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(error) => {
                debug!("list failed for {}: {}", path.display(), error);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Combine a list of file names with a base path into full path strings.
    pub fn convert_full_paths(&self, files: &[String], path: &Path) -> Vec<String> {
        paths::convert_full_paths(files, path)
    }

    // Remove

    /// Remove a file or directory. A nonexistent path reports failure.
    pub fn remove_file(&self, path: &Path) -> bool {
        let result = match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(error) => {
                debug!("remove failed for {}: {}", path.display(), error);
                return false;
            }
        };

        match result {
            Ok(()) => true,
            Err(error) => {
                debug!("remove failed for {}: {}", path.display(), error);
                false
            }
        }
    }

    // Copy / move, synchronous

    /// Copy a file, blocking the calling context. Large files will stall a
    /// latency-sensitive caller; use [`copy_file_with_progress`] for those.
    ///
    /// [`copy_file_with_progress`]: Self::copy_file_with_progress
    pub fn copy_file(&self, from: &Path, to: &Path) -> bool {
        if let Some(parent) = to.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        match std::fs::copy(from, to) {
            Ok(_) => true,
            Err(error) => {
                debug!(
                    "copy failed {} -> {}: {}",
                    from.display(),
                    to.display(),
                    error
                );
                false
            }
        }
    }

    /// Move a file, blocking the calling context. Renames when possible and
    /// falls back to copy-then-remove across devices.
    pub fn move_file(&self, from: &Path, to: &Path) -> bool {
        if let Some(parent) = to.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return false;
            }
        }

        if std::fs::rename(from, to).is_ok() {
            return true;
        }

        if !self.copy_file(from, to) {
            return false;
        }
        self.remove_file(from)
    }

    // Copy / move, asynchronous with progress

    /// Copy a file on a background task, reporting fractional progress.
    ///
    /// Requires a tokio runtime. The channel yields `Progress` values in
    /// non-decreasing order, then exactly one `Finished` event. A failed copy
    /// leaves the destination in whatever partial state the write reached.
    pub fn copy_file_with_progress(
        &self,
        from: &Path,
        to: &Path,
    ) -> mpsc::Receiver<TransferEvent> {
        transfer::spawn_transfer(from.to_path_buf(), to.to_path_buf(), false)
    }

    /// Move a file on a background task, reporting fractional progress. The
    /// source is removed only after a fully successful copy.
    pub fn move_file_with_progress(
        &self,
        from: &Path,
        to: &Path,
    ) -> mpsc::Receiver<TransferEvent> {
        transfer::spawn_transfer(from.to_path_buf(), to.to_path_buf(), true)
    }

    // Metadata

    /// Bundle name, extension, size and dates for a path.
    pub fn file_information(&self, path: &Path) -> Option<FileAttribute> {
        FileAttribute::from_path(path)
    }

    /// File size as a string, raw byte count or converted to a human-readable
    /// unit.
    pub fn file_size(&self, path: &Path, convert_unit: bool) -> Option<String> {
        let metadata = std::fs::metadata(path).ok()?;

        if convert_unit {
            Some(crate::utils::size::convert_file_size(metadata.len()))
        } else {
            Some(metadata.len().to_string())
        }
    }

    pub fn file_creation_date(&self, path: &Path) -> Option<DateTime<Local>> {
        FileAttribute::from_path(path).map(|attribute| attribute.creation_date)
    }

    /// Creation date rendered with a caller-supplied chrono format string.
    pub fn file_creation_date_formatted(&self, path: &Path, format: &str) -> Option<String> {
        self.file_creation_date(path)
            .map(|date| date.format(format).to_string())
    }

    pub fn file_modification_date(&self, path: &Path) -> Option<DateTime<Local>> {
        FileAttribute::from_path(path).map(|attribute| attribute.modification_date)
    }

    /// Modification date rendered with a caller-supplied chrono format string.
    pub fn file_modification_date_formatted(&self, path: &Path, format: &str) -> Option<String> {
        self.file_modification_date(path)
            .map(|date| date.format(format).to_string())
    }

    /// True only for actual directories; false for files and nonexistent
    /// paths.
    pub fn is_directory(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    /// Directory check by URL; false unless the URL uses the `file` scheme.
    pub fn is_directory_url(&self, url: &Url) -> bool {
        if url.scheme() != "file" {
            return false;
        }

        url.to_file_path()
            .map(|path| self.is_directory(&path))
            .unwrap_or(false)
    }
}
