//! OpenAI-compatible `chat/completions` wire format, shared by the hosted and
//! local clients.

use crate::error::{ConvertError, ProviderError};
use crate::pipeline::encode::EncodedImage;
use crate::prompts::Prompt;
use crate::provider::{CallOptions, Transcription};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// ── Request ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

// ── Response ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Client ───────────────────────────────────────────────────────────────

/// A `POST {base_url}/chat/completions` client.
pub(crate) struct ChatCompletionsClient {
    http: Client,
    provider: &'static str,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

impl ChatCompletionsClient {
    pub(crate) fn new(
        provider: &'static str,
        base_url: &str,
        api_key: Option<String>,
        model: String,
        timeout_secs: u64,
    ) -> Result<Self, ConvertError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConvertError::Unexpected(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            provider,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
            timeout_secs,
        })
    }

    pub(crate) fn model(&self) -> &str {
        &self.model
    }

    pub(crate) async fn complete(
        &self,
        image: &EncodedImage,
        prompt: &Prompt,
        options: &CallOptions,
    ) -> Result<Transcription, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                RequestMessage {
                    role: "system",
                    content: MessageContent::Text(&prompt.system),
                },
                RequestMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text { text: &prompt.user },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image.data_uri(),
                                detail: "high",
                            },
                        },
                    ]),
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header("X-Title", "pdf2markdown")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!("POST {} (model {})", self.endpoint, self.model);
        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                self.provider,
                status.as_u16(),
                error_message(&body),
                retry_after,
            ));
        }

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        parse_response(self.provider, &body)
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: self.provider.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            ProviderError::Transport {
                provider: self.provider.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

/// Pull `error.message` out of an OpenAI-style error body, else return the
/// body itself (shortened).
fn error_message(body: &str) -> String {
    if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(body) {
        return env.error.message;
    }
    let trimmed = body.trim();
    match trimmed.char_indices().nth(300) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

fn parse_response(provider: &str, body: &str) -> Result<Transcription, ProviderError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed {
            provider: provider.to_string(),
            detail: e.to_string(),
        })?;

    let usage = parsed.usage.unwrap_or_default();
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed {
            provider: provider.to_string(),
            detail: "response has no choices".into(),
        })?;

    let text = choice.message.content.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse {
            provider: provider.to_string(),
        });
    }

    Ok(Transcription {
        text,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        truncated: choice.finish_reason.as_deref() == Some("length"),
    })
}
