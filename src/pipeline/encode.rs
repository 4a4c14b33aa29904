//! Image encoding: `DynamicImage` → base64 PNG.
//!
//! Vision APIs accept images as base64 data embedded in the JSON request
//! body. PNG keeps rendered text crisp; JPEG artefacts around glyph edges
//! measurably hurt transcription at modest DPI.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A page image ready to attach to a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    /// Base64 (standard alphabet, padded) image bytes.
    pub data: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    /// `data:<mime>;base64,<data>`, the form OpenAI-compatible APIs expect.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<EncodedImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        data.len()
    );

    Ok(EncodedImage {
        mime_type: "image/png",
        data,
        width: img.width(),
        height: img.height(),
    })
}
