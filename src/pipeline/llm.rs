//! Model interaction: build the page prompt, call the model, retry.
//!
//! This stage is intentionally thin. Prompt text lives in [`crate::prompts`]
//! and the wire format in [`crate::provider`], so neither can leak into the
//! retry and error-handling logic here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx errors and dropped connections are transient and frequent
//! under load. Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`) avoids
//! a thundering herd: with a 500 ms base and 3 retries the waits are
//! 500 ms → 1 s → 2 s. A server `Retry-After` longer than that wins.
//! Authentication failures and other 4xx responses are returned immediately.

use crate::config::ConversionConfig;
use crate::error::{ConvertError, ProviderError};
use crate::output::PageResult;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::{build_prompt, PromptStyle};
use crate::provider::{CallOptions, VisionModel};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Transcribe one encoded page.
///
/// `document_pages` is the source document's page count (used in the
/// prompt); `selected_pages` is the number of pages in this run (reported to
/// the progress callback).
///
/// Fails with [`ConvertError::Provider`] once a non-transient error occurs
/// or retries run out, and with [`ConvertError::EmptyPage`] when the model
/// never produced text and empty pages are not allowed.
pub async fn process_page(
    model: &dyn VisionModel,
    page_num: usize,
    image: &EncodedImage,
    document_pages: usize,
    selected_pages: usize,
    config: &ConversionConfig,
) -> Result<PageResult, ConvertError> {
    let style = if model.is_local() {
        PromptStyle::Compact
    } else {
        PromptStyle::Detailed
    };
    let prompt = build_prompt(
        page_num,
        document_pages,
        config.hints.as_deref(),
        style,
        config.system_prompt.as_deref(),
    );
    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, selected_pages);
    }

    let start = Instant::now();
    let mut retries: u32 = 0;

    loop {
        let outcome = match timeout(call_timeout, model.transcribe(image, &prompt, &options)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: model.name().to_string(),
                secs: config.api_timeout_secs,
            }),
        };

        match outcome {
            Ok(transcription) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {}ms",
                    page_num, transcription.input_tokens, transcription.output_tokens, duration_ms
                );
                if transcription.truncated {
                    warn!(
                        "Page {}: output hit the {}-token limit and may be incomplete",
                        page_num, options.max_tokens
                    );
                }
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_complete(page_num, selected_pages, transcription.text.len());
                }
                return Ok(PageResult {
                    page_num,
                    markdown: transcription.text,
                    input_tokens: transcription.input_tokens,
                    output_tokens: transcription.output_tokens,
                    duration_ms,
                    retries,
                    truncated: transcription.truncated,
                });
            }

            Err(err) if err.is_transient() && retries < config.max_retries => {
                retries += 1;
                let delay = backoff_delay(
                    config.retry_backoff_ms,
                    retries,
                    err.retry_after(),
                    call_timeout,
                );
                warn!(
                    "Page {}: retry {}/{} after {}ms ({})",
                    page_num,
                    retries,
                    config.max_retries,
                    delay.as_millis(),
                    err
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_retry(page_num, retries, &err.to_string());
                }
                sleep(delay).await;
            }

            Err(ProviderError::EmptyResponse { .. }) if config.allow_empty_pages => {
                warn!("Page {}: model returned nothing, emitting an empty page", page_num);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_complete(page_num, selected_pages, 0);
                }
                return Ok(PageResult {
                    page_num,
                    markdown: String::new(),
                    input_tokens: 0,
                    output_tokens: 0,
                    duration_ms: start.elapsed().as_millis() as u64,
                    retries,
                    truncated: false,
                });
            }

            Err(err) => {
                let fatal = match err {
                    ProviderError::EmptyResponse { .. } => ConvertError::EmptyPage {
                        page: page_num,
                        attempts: retries + 1,
                    },
                    source => ConvertError::Provider {
                        page: page_num,
                        source,
                    },
                };
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_error(page_num, selected_pages, &fatal.to_string());
                }
                return Err(fatal);
            }
        }
    }
}

/// Sampling options from the conversion config.
fn build_options(config: &ConversionConfig) -> CallOptions {
    CallOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Delay before retry number `attempt` (1-based), never longer than `cap`.
fn backoff_delay(
    base_ms: u64,
    attempt: u32,
    retry_after: Option<Duration>,
    cap: Duration,
) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let backoff = Duration::from_millis(base_ms.saturating_mul(1u64 << shift));
    let delay = match retry_after {
        Some(server) if server > backoff => server,
        _ => backoff,
    };
    delay.min(cap)
}
