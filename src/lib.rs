//! Fileferry Library
//!
//! This library provides a single-transfer HTTP downloader with progress events
//! and a sandbox-scoped file-system helper.

pub mod core;
pub mod error;
pub mod utils;
