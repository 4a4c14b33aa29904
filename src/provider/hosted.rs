//! Hosted OpenAI-compatible API (OpenAI, OpenRouter, Azure-style gateways).

use crate::config::ProviderConfig;
use crate::error::{ConvertError, ProviderError};
use crate::pipeline::encode::EncodedImage;
use crate::prompts::Prompt;
use crate::provider::chat::ChatCompletionsClient;
use crate::provider::{CallOptions, Transcription, VisionModel};
use async_trait::async_trait;

/// Hosted model authenticated with a bearer key.
pub struct HostedModel {
    client: ChatCompletionsClient,
}

impl HostedModel {
    /// Fails with [`ConvertError::ProviderNotConfigured`] when no key is set.
    pub fn new(config: &ProviderConfig, timeout_secs: u64) -> Result<Self, ConvertError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConvertError::ProviderNotConfigured {
                provider: "openai".into(),
                hint: "Set OPENAI_API_KEY (or pass --api-key), or use --provider ollama for a local model.".into(),
            })?;

        let client = ChatCompletionsClient::new(
            "openai",
            &config.resolved_base_url(),
            Some(api_key.to_string()),
            config.resolved_model(),
            timeout_secs,
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl VisionModel for HostedModel {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    async fn transcribe(
        &self,
        image: &EncodedImage,
        prompt: &Prompt,
        options: &CallOptions,
    ) -> Result<Transcription, ProviderError> {
        self.client.complete(image, prompt, options).await
    }
}
