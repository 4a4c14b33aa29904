//! Local inference server (Ollama, llama.cpp server, LM Studio) through its
//! OpenAI-compatible endpoint.

use crate::config::ProviderConfig;
use crate::error::{ConvertError, ProviderError};
use crate::pipeline::encode::EncodedImage;
use crate::prompts::Prompt;
use crate::provider::chat::ChatCompletionsClient;
use crate::provider::{CallOptions, Transcription, VisionModel};
use async_trait::async_trait;

/// Output cap for local models. Small vision models tend to loop and repeat
/// themselves when allowed long generations.
pub const LOCAL_MAX_TOKENS: usize = 2048;

/// Model served by a local inference server. No credential is sent.
pub struct LocalModel {
    client: ChatCompletionsClient,
}

impl LocalModel {
    pub fn new(config: &ProviderConfig, timeout_secs: u64) -> Result<Self, ConvertError> {
        let client = ChatCompletionsClient::new(
            "ollama",
            &config.resolved_base_url(),
            None,
            config.resolved_model(),
            timeout_secs,
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl VisionModel for LocalModel {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn transcribe(
        &self,
        image: &EncodedImage,
        prompt: &Prompt,
        options: &CallOptions,
    ) -> Result<Transcription, ProviderError> {
        let capped = CallOptions {
            max_tokens: options.max_tokens.min(LOCAL_MAX_TOKENS),
            ..*options
        };
        self.client.complete(image, prompt, &capped).await
    }
}
