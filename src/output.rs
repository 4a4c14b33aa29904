//! Result types produced by a conversion run.

use crate::pipeline::input::SourceFormat;
use serde::{Deserialize, Serialize};

/// The Markdown transcription of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based ordinal of the page in the source document.
    pub page_num: usize,
    /// Markdown fragment (post-processed unless disabled).
    pub markdown: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Wall-clock time of the model call(s), including retries.
    pub duration_ms: u64,
    /// Number of retries needed (0 = first attempt succeeded).
    pub retries: u32,
    /// The model stopped at its output-token limit.
    pub truncated: bool,
}

/// Facts about the source document, available without a model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub format: SourceFormat,
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    /// PDF version, e.g. `Pdf1_7`. Empty for images.
    pub pdf_version: String,
}

/// Aggregate numbers for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages selected and transcribed.
    pub processed_pages: usize,
    /// Pages whose transcription came back empty (only with `allow_empty_pages`).
    pub empty_pages: usize,
    pub total_retries: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// Everything a successful conversion returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The assembled document.
    pub markdown: String,
    /// Per-page results in ascending page order.
    pub pages: Vec<PageResult>,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}
