//! Pass-through to any provider known to `edgequake-llm` (anthropic, gemini,
//! azure, mistral, …), created by name through its `ProviderFactory`.
//!
//! The factory reads each provider's own credential variables
//! (`ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, …).

use crate::error::{ConvertError, ProviderError};
use crate::pipeline::encode::EncodedImage;
use crate::prompts::Prompt;
use crate::provider::{CallOptions, Transcription, VisionModel};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Adapter from an `edgequake-llm` provider to [`VisionModel`].
pub struct RegistryModel {
    name: String,
    model: String,
    provider: Arc<dyn LLMProvider>,
}

impl RegistryModel {
    /// Create the named provider. A model must be given; defaults differ too
    /// much between providers to guess one.
    pub fn new(name: &str, model: Option<&str>) -> Result<Self, ConvertError> {
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ConvertError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: "Set PDF2MD_MODEL or pass --model with a vision-capable model.".into(),
            })?;

        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            ConvertError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: format!("{e}"),
            }
        })?;

        Ok(Self::from_provider(name, model, provider))
    }

    /// Wrap an already-constructed provider.
    pub fn from_provider(name: &str, model: &str, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl VisionModel for RegistryModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn transcribe(
        &self,
        image: &EncodedImage,
        prompt: &Prompt,
        options: &CallOptions,
    ) -> Result<Transcription, ProviderError> {
        let image_data = ImageData::new(image.data.clone(), image.mime_type).with_detail("high");
        let messages = vec![
            ChatMessage::system(prompt.system.as_str()),
            ChatMessage::user_with_images(prompt.user.as_str(), vec![image_data]),
        ];
        let completion = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&completion))
            .await
            .map_err(|e| classify(&self.name, e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: self.name.clone(),
            });
        }

        Ok(Transcription {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
            truncated: false,
        })
    }
}

/// A status code only counts when it follows a status-like word, so numbers
/// elsewhere in the message ("max_tokens 4290 exceeds …") are not mistaken for one.
static RE_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:status(?:\s+code)?|http(?:/[\d.]+)?|error\s+code)\s*[:=]?\s*([1-5]\d{2})\b")
        .unwrap()
});

/// Recover a retry class from an `edgequake-llm` error message, which does
/// not expose the HTTP status separately.
fn classify(provider: &str, message: String) -> ProviderError {
    let lower = message.to_lowercase();
    let status = RE_STATUS
        .captures(&message)
        .and_then(|caps| caps[1].parse::<u16>().ok())
        .or_else(|| {
            if lower.contains("unauthorized") || lower.contains("invalid api key") {
                Some(401)
            } else if lower.contains("forbidden") {
                Some(403)
            } else if lower.contains("rate limit") || lower.contains("too many requests") {
                Some(429)
            } else {
                None
            }
        });

    match status {
        Some(code) if code >= 400 => ProviderError::from_status(provider, code, message, None),
        _ => ProviderError::Transport {
            provider: provider.to_string(),
            detail: message,
        },
    }
}
