use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FerryError>;

#[derive(Error, Debug)]
pub enum FerryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Home directory not found")]
    HomeDirectoryNotFound,
}
