//! Conversion entry points.
//!
//! Every entry point funnels into [`convert_document`], which runs the
//! stages in a fixed order and fails fast: the first error from any stage
//! aborts the run and no partial Markdown is returned.

use crate::assemble::assemble_document;
use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, PageResult};
use crate::pipeline::input::{self, SourceDocument};
use crate::pipeline::{encode, llm, postprocess, render, select};
use crate::provider::{self, VisionModel};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Convert in-memory PDF or image bytes to Markdown.
///
/// This is the primary entry point for the library; the CLI feeds it stdin.
///
/// # Errors
/// - [`ConvertError::EmptyInput`] / [`ConvertError::UnsupportedFormat`] before
///   anything else runs
/// - [`ConvertError::InvalidRange`] when the page selection does not fit
/// - [`ConvertError::Provider`] / [`ConvertError::EmptyPage`] when a page
///   cannot be transcribed
///
/// # Example
/// ```rust,no_run
/// use pdf2markdown::{convert_bytes, ConversionConfig, ProviderConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.pdf")?;
/// let config = ConversionConfig::builder()
///     .provider(ProviderConfig::ollama())
///     .build()?;
/// let output = convert_bytes(bytes, &config).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_bytes(
    bytes: Vec<u8>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let source = SourceDocument::from_bytes(bytes)?;
    convert_document(&source, config).await
}

/// Convert a local PDF or image file.
pub async fn convert_file(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let source = input::read_file(path.as_ref()).await?;
    convert_document(&source, config).await
}

/// Convert bytes with an explicit model client, ignoring `config.provider`.
pub async fn convert_with_model(
    bytes: Vec<u8>,
    model: Arc<dyn VisionModel>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let mut config = config.clone();
    config.vision_model = Some(model);
    convert_bytes(bytes, &config).await
}

/// Convert a file and write the Markdown to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed run never leaves a
/// partial file behind.
pub async fn convert_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, ConvertError> {
    let output = convert_file(input_path, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert_bytes`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn convert_sync(
    bytes: Vec<u8>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Unexpected(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_bytes(bytes, config))
}

/// Read page count and document info without converting anything.
///
/// Does not require a model provider or API key.
pub async fn inspect_bytes(
    bytes: Vec<u8>,
    password: Option<&str>,
) -> Result<DocumentMetadata, ConvertError> {
    let source = SourceDocument::from_bytes(bytes)?;
    render::extract_metadata(&source, password).await
}

/// Run the full pipeline on an already-sniffed document.
pub async fn convert_document(
    source: &SourceDocument,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let total_start = Instant::now();
    info!("Starting conversion of {} input", source.format());

    // ── Step 1: Document info ────────────────────────────────────────────
    let metadata = render::extract_metadata(source, config.password.as_deref()).await?;
    let total_pages = metadata.page_count;
    info!("Document has {} pages", total_pages);

    // ── Step 2: Page selection ───────────────────────────────────────────
    let page_nums = select::select_pages(&config.pages, total_pages)?;
    let selected = page_nums.len();
    debug!("Selected {} pages for conversion", selected);

    // ── Step 3: Model client ─────────────────────────────────────────────
    let model = resolve_model(config)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(selected);
    }

    // ── Step 4: Rasterise pages ──────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_pages(source, config, &page_nums).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", rendered.len(), render_duration_ms);

    // ── Step 5: Encode images to base64 ──────────────────────────────────
    let encoded = rendered
        .iter()
        .map(|page| {
            encode::encode_page(&page.image)
                .map(|img| (page.page_num, img))
                .map_err(|e| ConvertError::RasterisationFailed {
                    page: page.page_num,
                    detail: format!("Image encoding failed: {}", e),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    drop(rendered);

    // ── Step 6: Transcribe pages ─────────────────────────────────────────
    let llm_start = Instant::now();
    let model_ref: &dyn VisionModel = model.as_ref();
    let mut pages: Vec<PageResult> = if config.concurrency <= 1 {
        let mut results = Vec::with_capacity(encoded.len());
        for (page_num, image) in &encoded {
            results.push(
                llm::process_page(model_ref, *page_num, image, total_pages, selected, config)
                    .await?,
            );
        }
        results
    } else {
        stream::iter(encoded.iter().map(|(page_num, image)| {
            llm::process_page(model_ref, *page_num, image, total_pages, selected, config)
        }))
        .buffer_unordered(config.concurrency)
        .try_collect::<Vec<_>>()
        .await?
    };
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // Completion order is arbitrary with concurrency > 1.
    pages.sort_by_key(|p| p.page_num);

    // ── Step 7: Post-process markdown ────────────────────────────────────
    if config.postprocess {
        for page in &mut pages {
            page.markdown = postprocess::clean_markdown(&page.markdown);
            if model.is_local() {
                page.markdown = postprocess::dedupe_repetitions(&page.markdown);
            }
        }
    }

    // ── Step 8: Assemble final document ──────────────────────────────────
    let front_matter = config.include_metadata.then_some(&metadata);
    let markdown = assemble_document(&pages, &config.page_separator, front_matter);

    // ── Step 9: Compute stats ────────────────────────────────────────────
    let stats = ConversionStats {
        total_pages,
        processed_pages: pages.len(),
        empty_pages: pages.iter().filter(|p| p.markdown.is_empty()).count(),
        total_retries: pages.iter().map(|p| p.retries).sum(),
        total_input_tokens: pages.iter().map(|p| p.input_tokens).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
        llm_duration_ms,
    };

    info!(
        "Conversion complete: {} pages, {} retries, {}ms total",
        stats.processed_pages, stats.total_retries, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(selected);
    }

    Ok(ConversionOutput {
        markdown,
        pages,
        metadata,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// A pre-built client wins; otherwise build one from `config.provider`.
fn resolve_model(config: &ConversionConfig) -> Result<Arc<dyn VisionModel>, ConvertError> {
    match config.vision_model {
        Some(ref model) => Ok(Arc::clone(model)),
        None => provider::create_model(&config.provider, config.api_timeout_secs),
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers never observe a half-written file.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), ConvertError> {
    let write_err = |e| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}
