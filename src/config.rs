//! Configuration types for PDF/image-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The inference backend is described
//! separately by [`ProviderConfig`], which is supplied once per run and never
//! mutated while pages are in flight.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use crate::provider::VisionModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default hosted endpoint (OpenAI-compatible).
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default hosted model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default local endpoint (Ollama's OpenAI-compatible API).
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
/// Default local vision model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2-vision";

/// Configuration for one conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2markdown::{ConversionConfig, PageSelection, PageSeparator};
///
/// let config = ConversionConfig::builder()
///     .dpi(200)
///     .pages(PageSelection::Range(1, 3))
///     .page_separator(PageSeparator::HorizontalRule)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 150.
    ///
    /// 150 DPI keeps body text legible for vision models while staying well
    /// under typical upload limits. Raise it for small fonts.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps oversized pages (posters, engineering drawings) and oversized
    /// standalone images independently of DPI.
    pub max_rendered_pixels: u32,

    /// Number of pages transcribed at once. Default: 1 (strictly sequential).
    pub concurrency: usize,

    /// Inference backend description.
    pub provider: ProviderConfig,

    /// Pre-constructed model client. Takes precedence over `provider`.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    ///
    /// Local models are additionally capped at 2048 by the local client.
    pub max_tokens: usize,

    /// Retry attempts after a transient provider failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,

    /// Extra formatting hints appended to every page prompt.
    pub hints: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Page separator in assembled output. Default: blank line.
    pub page_separator: PageSeparator,

    /// Prepend YAML front-matter with document metadata. Default: false.
    pub include_metadata: bool,

    /// Run the deterministic Markdown cleanup rules. Default: true.
    pub postprocess: bool,

    /// Emit an empty fragment instead of failing when the model returns nothing. Default: false.
    pub allow_empty_pages: bool,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 1,
            provider: ProviderConfig::default(),
            vision_model: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            password: None,
            system_prompt: None,
            hints: None,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            include_metadata: false,
            postprocess: true,
            allow_empty_pages: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("provider", &self.provider)
            .field(
                "vision_model",
                &self.vision_model.as_ref().map(|m| m.name().to_string()),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field("postprocess", &self.postprocess)
            .field("allow_empty_pages", &self.allow_empty_pages)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.config.provider = provider;
        self
    }

    /// Use an already-constructed model client (tests, custom middleware).
    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn hints(mut self, hints: impl Into<String>) -> Self {
        self.config.hints = Some(hints.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn include_metadata(mut self, v: bool) -> Self {
        self.config.include_metadata = v;
        self
    }

    pub fn postprocess(mut self, v: bool) -> Self {
        self.config.postprocess = v;
        self
    }

    pub fn allow_empty_pages(mut self, v: bool) -> Self {
        self.config.allow_empty_pages = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.pages {
            PageSelection::from_bounds(start as i64, end as i64)?;
        }
        Ok(self.config)
    }
}

// ── Provider configuration ───────────────────────────────────────────────

/// Which inference backend to call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted OpenAI-compatible API, authenticated with a key. (default)
    #[default]
    OpenAi,
    /// Local inference server (Ollama or any OpenAI-compatible server), no key.
    Ollama,
    /// Any other provider known to `edgequake-llm` (anthropic, gemini, azure, …).
    Named(String),
}

impl ProviderKind {
    /// Parse a provider name as given on the command line or in the environment.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "" | "openai" => ProviderKind::OpenAi,
            "ollama" | "local" => ProviderKind::Ollama,
            other => ProviderKind::Named(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Named(name) => name,
        }
    }
}

/// Endpoint, credential and model for the inference backend.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Overrides the provider's default base URL.
    pub base_url: Option<String>,
    /// Credential for hosted providers.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Overrides the provider's default model.
    pub model: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish()
    }
}

impl ProviderConfig {
    /// Hosted provider with the given key.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Local provider at the default Ollama address.
    pub fn ollama() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Read the provider description from process environment variables.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `PDF2MD_PROVIDER` | `openai` (default), `ollama`, or an edgequake-llm provider name |
    /// | `PDF2MD_MODEL` | model for any provider |
    /// | `OPENAI_API_KEY` | hosted credential |
    /// | `OPENAI_API_BASE` | hosted base URL |
    /// | `OPENAI_DEFAULT_MODEL` | hosted model |
    /// | `OLLAMA_BASE_URL` | local base URL |
    /// | `OLLAMA_MODEL` | local model |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let kind = get("PDF2MD_PROVIDER")
            .map(|p| ProviderKind::parse(&p))
            .unwrap_or_default();

        let (base_url, api_key, model) = match kind {
            ProviderKind::OpenAi => (
                get("OPENAI_API_BASE"),
                get("OPENAI_API_KEY"),
                get("PDF2MD_MODEL").or_else(|| get("OPENAI_DEFAULT_MODEL")),
            ),
            ProviderKind::Ollama => (
                get("OLLAMA_BASE_URL"),
                None,
                get("PDF2MD_MODEL").or_else(|| get("OLLAMA_MODEL")),
            ),
            ProviderKind::Named(_) => (None, None, get("PDF2MD_MODEL")),
        };

        Self {
            kind,
            base_url,
            api_key,
            model,
        }
    }

    /// Base URL with the provider default applied, without a trailing slash.
    pub fn resolved_base_url(&self) -> String {
        let url = match (&self.base_url, &self.kind) {
            (Some(url), _) => url.as_str(),
            (None, ProviderKind::Ollama) => DEFAULT_OLLAMA_BASE_URL,
            (None, _) => DEFAULT_OPENAI_BASE_URL,
        };
        url.trim_end_matches('/').to_string()
    }

    /// Model with the provider default applied.
    pub fn resolved_model(&self) -> String {
        match (&self.model, &self.kind) {
            (Some(model), _) => model.clone(),
            (None, ProviderKind::Ollama) => DEFAULT_OLLAMA_MODEL.to_string(),
            (None, _) => DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the document to convert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
}

impl PageSelection {
    /// Build a range from signed user input, rejecting non-positive bounds.
    ///
    /// The page count is not known yet, so `end` is only checked against it
    /// later by [`crate::pipeline::select::select_pages`].
    pub fn from_bounds(start: i64, end: i64) -> Result<Self, ConvertError> {
        if start < 1 || end < 1 {
            return Err(ConvertError::InvalidRange {
                start,
                end,
                page_count: None,
                reason: "page numbers start at 1",
            });
        }
        Ok(PageSelection::Range(start as usize, end as usize))
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No marker; pages joined with a blank line. (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the page with the given ordinal.
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }

    /// Parse the CLI spelling: `none`, `hr`, `comment`, or anything else verbatim.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" | "" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s.to_string()),
        }
    }
}
