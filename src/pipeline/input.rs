//! Input resolution: turn raw bytes (stdin or a file) into a typed document.
//!
//! The format is decided from magic bytes rather than a file extension, since
//! the usual source is an anonymous stdin stream. Sniffing happens before any
//! other stage, so an unsupported input fails without touching pdfium or the
//! model provider.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Encodings the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Pdf,
    Png,
    Jpeg,
    Bmp,
}

impl SourceFormat {
    /// Detect the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            Some(SourceFormat::Pdf)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(SourceFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(SourceFormat::Jpeg)
        } else if bytes.starts_with(b"BM") {
            Some(SourceFormat::Bmp)
        } else {
            None
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, SourceFormat::Pdf)
    }

    /// The matching `image` crate format, for image inputs.
    pub fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            SourceFormat::Pdf => None,
            SourceFormat::Png => Some(image::ImageFormat::Png),
            SourceFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            SourceFormat::Bmp => Some(image::ImageFormat::Bmp),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceFormat::Pdf => "PDF",
            SourceFormat::Png => "PNG",
            SourceFormat::Jpeg => "JPEG",
            SourceFormat::Bmp => "BMP",
        };
        f.write_str(name)
    }
}

/// Source bytes plus their detected format. Immutable once built.
#[derive(Clone)]
pub struct SourceDocument {
    bytes: Vec<u8>,
    format: SourceFormat,
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl SourceDocument {
    /// Validate and wrap raw input bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConvertError> {
        if bytes.is_empty() {
            return Err(ConvertError::EmptyInput);
        }
        let format = SourceFormat::sniff(&bytes).ok_or_else(|| {
            let n = bytes.len().min(4);
            ConvertError::UnsupportedFormat {
                detail: format!("unrecognised leading bytes {:02X?}", &bytes[..n]),
            }
        })?;
        debug!("Detected {} input ({} bytes)", format, bytes.len());
        Ok(Self { bytes, format })
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Read a local file and wrap it as a [`SourceDocument`].
pub async fn read_file(path: &Path) -> Result<SourceDocument, ConvertError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConvertError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ConvertError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ConvertError::Unexpected(format!("reading {}: {}", path.display(), e)),
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    SourceDocument::from_bytes(bytes)
}
