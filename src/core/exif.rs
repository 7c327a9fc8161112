//! Image-metadata extension for [`FileController`].
//!
//! Read-only EXIF extraction via `kamadak-exif`; only the primary image's
//! fields are reported.

use crate::core::files::FileController;
use exif::{Context, In, Reader};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

impl FileController {
    /// All image properties of the primary image at `path`, keyed by tag
    /// name. `None` when the file is missing or carries no readable metadata.
    pub fn image_properties(&self, path: &Path) -> Option<HashMap<String, String>> {
        let exif = read_metadata(path)?;

        let properties: HashMap<String, String> = exif
            .fields()
            .filter(|field| field.ifd_num == In::PRIMARY)
            .map(|field| {
                (
                    field.tag.to_string(),
                    field.display_value().with_unit(&exif).to_string(),
                )
            })
            .collect();

        if properties.is_empty() {
            None
        } else {
            Some(properties)
        }
    }

    /// Only the EXIF sub-dictionary of the image at `path`. `None` when there
    /// is no Exif IFD.
    pub fn exif_information(&self, path: &Path) -> Option<HashMap<String, String>> {
        let exif = read_metadata(path)?;

        let information: HashMap<String, String> = exif
            .fields()
            .filter(|field| field.ifd_num == In::PRIMARY)
            .filter(|field| matches!(field.tag.0, Context::Exif))
            .map(|field| {
                (
                    field.tag.to_string(),
                    field.display_value().with_unit(&exif).to_string(),
                )
            })
            .collect();

        if information.is_empty() {
            None
        } else {
            Some(information)
        }
    }
}

fn read_metadata(path: &Path) -> Option<exif::Exif> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    Reader::new().read_from_container(&mut reader).ok()
}
