pub mod attribute;
pub mod download;
pub mod exif;
pub mod files;
pub mod transfer;
