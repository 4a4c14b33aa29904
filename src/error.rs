//! Error types for the pdf2markdown library.
//!
//! Two types reflect two layers of failure:
//!
//! * [`ConvertError`] — **Fatal** for the whole run. Every pipeline stage fails
//!   fast: a bad page range, an unreadable input, or a page the model could not
//!   transcribe aborts the conversion and no partial Markdown is produced.
//!
//! * [`ProviderError`] — a failed call to the inference backend. The pipeline
//!   retries the transient variants (see [`ProviderError::is_transient`]) and
//!   wraps the last one in [`ConvertError::Provider`] once retries run out.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the pdf2markdown library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No bytes were supplied.
    #[error("No input data received.\nUsage: pdf2markdown [page_start] [page_end] < input.pdf")]
    EmptyInput,

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The bytes are neither a parseable PDF nor a supported image encoding.
    #[error("Unsupported input format: {detail}\nSupported formats: PDF, PNG, JPEG, BMP")]
    UnsupportedFormat { detail: String },

    // ── Page selection ────────────────────────────────────────────────────
    /// Requested page bounds are inverted, non-positive, or past the last page.
    ///
    /// `page_count` is `None` when the bounds were rejected before the
    /// document was read.
    #[error(
        "Invalid page range {start}-{end}{}: {reason}",
        .page_count.map(|n| format!(" for a document with {n} pages")).unwrap_or_default()
    )]
    InvalidRange {
        start: i64,
        end: i64,
        page_count: Option<usize>,
        reason: &'static str,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// pdfium could not render a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider cannot be constructed (missing key etc.).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The inference call failed and retries (if any) were exhausted.
    #[error("Page {page}: {source}")]
    Provider {
        page: usize,
        #[source]
        source: ProviderError,
    },

    /// The model kept returning nothing for a page and empty pages are not allowed.
    #[error("Page {page}: model returned an empty transcription after {attempts} attempts")]
    EmptyPage { page: usize, attempts: u32 },

    // ── Output / config errors ────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// A failed call to an inference provider.
///
/// Every variant carries the provider name so messages stay readable when
/// several backends are configured across runs.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ProviderError {
    /// Connection refused, DNS failure, reset mid-request.
    #[error("{provider}: request failed: {detail}")]
    Transport { provider: String, detail: String },

    /// No response within the configured timeout.
    #[error("{provider}: call timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// HTTP 401/403 — retrying will not help.
    #[error("{provider}: authentication failed (HTTP {status}): {message}")]
    Auth {
        provider: String,
        status: u16,
        message: String,
    },

    /// HTTP 429.
    #[error("{provider}: rate limit exceeded")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other non-success status.
    #[error("{provider}: HTTP {status}: {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("{provider}: malformed response: {detail}")]
    Malformed { provider: String, detail: String },

    /// The model answered but produced no text.
    #[error("{provider}: model returned an empty response")]
    EmptyResponse { provider: String },
}

impl ProviderError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport { .. }
            | ProviderError::Timeout { .. }
            | ProviderError::RateLimited { .. }
            | ProviderError::Malformed { .. }
            | ProviderError::EmptyResponse { .. } => true,
            ProviderError::Status { status, .. } => *status >= 500 || *status == 408,
            ProviderError::Auth { .. } => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Map an HTTP status and body to the matching variant.
    pub fn from_status(
        provider: &str,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    ) -> Self {
        let provider = provider.to_string();
        match status {
            401 | 403 => ProviderError::Auth {
                provider,
                status,
                message,
            },
            429 => ProviderError::RateLimited {
                provider,
                retry_after_secs,
            },
            _ => ProviderError::Status {
                provider,
                status,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_range_display() {
        let e = ConvertError::InvalidRange {
            start: 4,
            end: 2,
            page_count: Some(10),
            reason: "start is after end",
        };
        let msg = e.to_string();
        assert!(msg.contains("4-2"), "got: {msg}");
        assert!(msg.contains("10 pages"), "got: {msg}");
    }

    #[test]
    fn invalid_range_without_document() {
        let e = ConvertError::InvalidRange {
            start: 0,
            end: 3,
            page_count: None,
            reason: "page numbers start at 1",
        };
        assert_eq!(
            e.to_string(),
            "Invalid page range 0-3: page numbers start at 1"
        );
    }

    #[test]
    fn provider_error_wraps_page() {
        let e = ConvertError::Provider {
            page: 3,
            source: ProviderError::Timeout {
                provider: "openai".into(),
                secs: 60,
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 3"));
        assert!(msg.contains("60s"));
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status("openai", 401, "bad key".into(), None),
            ProviderError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            ProviderError::from_status("openai", 429, String::new(), Some(7)),
            ProviderError::RateLimited {
                retry_after_secs: Some(7),
                ..
            }
        ));
        assert!(matches!(
            ProviderError::from_status("ollama", 500, "boom".into(), None),
            ProviderError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn transient_classification() {
        let auth = ProviderError::from_status("openai", 403, "forbidden".into(), None);
        assert!(!auth.is_transient());

        let bad_request = ProviderError::from_status("openai", 400, "bad".into(), None);
        assert!(!bad_request.is_transient());

        let overloaded = ProviderError::from_status("openai", 503, "busy".into(), None);
        assert!(overloaded.is_transient());

        let empty = ProviderError::EmptyResponse {
            provider: "ollama".into(),
        };
        assert!(empty.is_transient());
    }

    #[test]
    fn retry_after_only_for_rate_limit() {
        let e = ProviderError::RateLimited {
            provider: "openai".into(),
            retry_after_secs: Some(2),
        };
        assert_eq!(e.retry_after(), Some(Duration::from_secs(2)));

        let e = ProviderError::Transport {
            provider: "openai".into(),
            detail: "reset".into(),
        };
        assert_eq!(e.retry_after(), None);
    }
}
