//! Rasterisation: turn selected pages into `DynamicImage`s.
//!
//! PDF pages go through pdfium. A standalone image is already a bitmap, so it
//! is decoded and passed through as the single page of its document, only
//! downscaled when it exceeds the pixel cap.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state that must not run on a
//! Tokio worker thread; image decoding is CPU-bound. Both run on the blocking
//! pool via `tokio::task::spawn_blocking`.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::DocumentMetadata;
use crate::pipeline::input::{SourceDocument, SourceFormat};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One rasterised page, tagged with its 1-based ordinal.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_num: usize,
    pub image: DynamicImage,
}

/// Bind to the pdfium shared library.
///
/// `PDFIUM_LIB_PATH` may name the library file or the directory holding it.
/// Otherwise `pdfium-auto` resolves its per-user cache, downloading the
/// platform build on first use. The system library search path is tried
/// when that fails.
pub fn bind_pdfium() -> Result<Pdfium, ConvertError> {
    if let Some(dir) = std::env::var_os("PDFIUM_LIB_PATH")
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
    {
        return bind_in_dir(&dir);
    }

    match pdfium_auto::bind_pdfium_silent() {
        Ok(pdfium) => Ok(pdfium),
        Err(auto_err) => {
            debug!("pdfium-auto failed ({}), trying the system library", auto_err);
            Pdfium::bind_to_system_library()
                .map(Pdfium::new)
                .map_err(|e| {
                    ConvertError::PdfiumBindingFailed(format!(
                        "{}; system library: {:?}",
                        auto_err, e
                    ))
                })
        }
    }
}

fn bind_in_dir(dir: &Path) -> Result<Pdfium, ConvertError> {
    let lib = Pdfium::pdfium_platform_library_name_at_path(dir);
    pdfium_auto::bind_pdfium_from_path(&lib)
        .map_err(|e| ConvertError::PdfiumBindingFailed(e.to_string()))
}

/// Rasterise the given pages of a document.
///
/// Returns pages in the order of `page_nums`.
pub async fn render_pages(
    source: &SourceDocument,
    config: &ConversionConfig,
    page_nums: &[usize],
) -> Result<Vec<RenderedPage>, ConvertError> {
    let source = source.clone();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();
    let page_nums = page_nums.to_vec();

    tokio::task::spawn_blocking(move || {
        if source.format().is_image() {
            let image = decode_image(&source, max_pixels)?;
            Ok(vec![RenderedPage { page_num: 1, image }])
        } else {
            render_pdf_blocking(
                source.bytes(),
                dpi,
                max_pixels,
                password.as_deref(),
                &page_nums,
            )
        }
    })
    .await
    .map_err(|e| ConvertError::Unexpected(format!("Render task panicked: {}", e)))?
}

/// Read page count and document info without rendering anything.
pub async fn extract_metadata(
    source: &SourceDocument,
    password: Option<&str>,
) -> Result<DocumentMetadata, ConvertError> {
    let source = source.clone();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || {
        if source.format().is_image() {
            // Header only: the pixel data is decoded once, by `render_pages`.
            let (width, height) = image_dimensions(&source)?;
            debug!("{} image is {}x{}", source.format(), width, height);
            Ok(DocumentMetadata {
                format: source.format(),
                page_count: 1,
                ..DocumentMetadata::default()
            })
        } else {
            extract_pdf_metadata_blocking(source.bytes(), pwd.as_deref())
        }
    })
    .await
    .map_err(|e| ConvertError::Unexpected(format!("Metadata task panicked: {}", e)))?
}

/// Pixel size for a page of `width_pt` × `height_pt` points at `dpi`, with
/// the longest edge capped at `max_pixels` and the aspect ratio kept.
pub fn target_size(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> (i32, i32) {
    let scale = dpi as f32 / 72.0;
    let mut w = (width_pt * scale).max(1.0);
    let mut h = (height_pt * scale).max(1.0);
    let longest = w.max(h);
    if longest > max_pixels as f32 {
        let shrink = max_pixels as f32 / longest;
        w *= shrink;
        h *= shrink;
    }
    (w.round().max(1.0) as i32, h.round().max(1.0) as i32)
}

fn image_format(source: &SourceDocument) -> Result<image::ImageFormat, ConvertError> {
    source
        .format()
        .image_format()
        .ok_or_else(|| ConvertError::Unexpected("image decoder called on a PDF".into()))
}

fn undecodable(source: &SourceDocument, e: image::ImageError) -> ConvertError {
    ConvertError::UnsupportedFormat {
        detail: format!("{} data could not be decoded: {}", source.format(), e),
    }
}

fn image_dimensions(source: &SourceDocument) -> Result<(u32, u32), ConvertError> {
    let format = image_format(source)?;
    ImageReader::with_format(Cursor::new(source.bytes()), format)
        .into_dimensions()
        .map_err(|e| undecodable(source, e))
}

fn decode_image(source: &SourceDocument, max_pixels: u32) -> Result<DynamicImage, ConvertError> {
    let format = image_format(source)?;
    let image = image::load_from_memory_with_format(source.bytes(), format)
        .map_err(|e| undecodable(source, e))?;

    if image.width().max(image.height()) > max_pixels {
        debug!(
            "Downscaling {}x{} image to fit {} px",
            image.width(),
            image.height(),
            max_pixels
        );
        return Ok(image.resize(max_pixels, max_pixels, FilterType::Lanczos3));
    }
    Ok(image)
}

fn load_document<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ConvertError> {
    pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ConvertError::WrongPassword
            } else {
                ConvertError::PasswordRequired
            }
        } else {
            ConvertError::UnsupportedFormat {
                detail: format!("not a parseable PDF: {}", err_str),
            }
        }
    })
}

fn render_pdf_blocking(
    bytes: &[u8],
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    page_nums: &[usize],
) -> Result<Vec<RenderedPage>, ConvertError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, bytes, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(page_nums.len());

    for &page_num in page_nums {
        if page_num == 0 || page_num > total_pages {
            return Err(ConvertError::RasterisationFailed {
                page: page_num,
                detail: format!("document has {} pages", total_pages),
            });
        }

        let page = pages
            .get((page_num - 1) as u16)
            .map_err(|e| ConvertError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

        let (width, height) = target_size(page.width().value, page.height().value, dpi, max_pixels);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ConvertError::RasterisationFailed {
                page: page_num,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        results.push(RenderedPage { page_num, image });
    }

    Ok(results)
}

fn extract_pdf_metadata_blocking(
    bytes: &[u8],
    password: Option<&str>,
) -> Result<DocumentMetadata, ConvertError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, bytes, password)?;

    let metadata = document.metadata();
    let pages = document.pages();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        format: SourceFormat::Pdf,
        page_count: pages.len() as usize,
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        pdf_version: format!("{:?}", document.version()),
    })
}
