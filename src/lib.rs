//! # pdf2markdown
//!
//! Transcribe PDF documents and page images to Markdown with multimodal
//! models.
//!
//! ## Why this crate?
//!
//! Text-extraction tools fail on scanned pages and mangle complex layouts:
//! multi-column text, formulas, and tables come out garbled or out of reading
//! order. Instead this crate rasterises each page into a PNG and lets a
//! vision-capable model read it as a human would, producing Markdown that
//! keeps headings, lists, tables, and LaTeX formulas.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG / BMP bytes
//!  │
//!  ├─ 1. Input    sniff the format from magic bytes
//!  ├─ 2. Select   validate the page range against the page count
//!  ├─ 3. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 4. Encode   PNG → base64
//!  ├─ 5. Model    hosted (OpenAI-compatible), local (Ollama), or any edgequake-llm provider
//!  ├─ 6. Polish   deterministic post-processing (fences, tables, whitespace)
//!  └─ 7. Output   pages joined in order + metadata + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2markdown::{convert_file, ConversionConfig, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // PDF2MD_PROVIDER / OPENAI_API_KEY / OLLAMA_BASE_URL …
//!     let config = ConversionConfig::builder()
//!         .provider(ProviderConfig::from_env())
//!         .build()?;
//!     let output = convert_file("document.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("tokens: {} in / {} out",
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2markdown` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2markdown = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, PageSelection, PageSeparator, ProviderConfig,
    ProviderKind,
};
pub use convert::{
    convert_bytes, convert_document, convert_file, convert_sync, convert_to_file,
    convert_with_model, inspect_bytes,
};
pub use error::{ConvertError, ProviderError};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, PageResult};
pub use pipeline::encode::EncodedImage;
pub use pipeline::input::{SourceDocument, SourceFormat};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{Prompt, PromptStyle};
pub use provider::{CallOptions, Transcription, VisionModel};
