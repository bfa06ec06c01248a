//! KMZ packaging: the KML document followed by the overlay images it references.

use std::io::{Cursor, Write};

use bytes::Bytes;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the document entry; readers look for the first `.kml` entry.
pub const DOCUMENT_ENTRY: &str = "wms.kml";

/// Archive path of the `index`-th overlay image, counted from zero.
pub fn image_entry(index: usize) -> String {
    format!("images/layer_{index}.png")
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct ArchivePackager {
    compression: CompressionMethod,
}

impl Default for ArchivePackager {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
        }
    }
}

impl ArchivePackager {
    /// Store entries uncompressed. Images are usually compressed already.
    pub fn stored() -> Self {
        Self {
            compression: CompressionMethod::Stored,
        }
    }

    /// Write the document entry, then each image under [`image_entry`] in
    /// slice order. The archive is built in memory and returned whole.
    pub fn package(&self, document: &[u8], images: &[Bytes]) -> Result<Bytes, ArchiveError> {
        let options = SimpleFileOptions::default().compression_method(self.compression);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        writer.start_file(DOCUMENT_ENTRY, options)?;
        writer.write_all(document)?;
        for (index, image) in images.iter().enumerate() {
            writer.start_file(image_entry(index), options)?;
            writer.write_all(image)?;
        }

        let cursor = writer.finish()?;
        Ok(Bytes::from(cursor.into_inner()))
    }
}
