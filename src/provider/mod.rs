//! Model clients: send one page image plus its prompt to a multimodal model.
//!
//! Every backend implements [`VisionModel`]. The pipeline holds an
//! `Arc<dyn VisionModel>` chosen once per run and never inspects which
//! concrete backend it is talking to, apart from [`VisionModel::is_local`],
//! which picks the prompt style and the repetition cleanup.
//!
//! | Kind | Type | Wire |
//! |------|------|------|
//! | `openai` | [`HostedModel`] | OpenAI chat completions, bearer key |
//! | `ollama` | [`LocalModel`] | Ollama's OpenAI-compatible `/v1`, no key |
//! | anything else | [`RegistryModel`] | `edgequake-llm` provider by name |
//!
//! Clients never retry; retry, backoff and the per-call timeout live in
//! [`crate::pipeline::llm`].

mod chat;
mod hosted;
mod local;
mod registry;

pub use hosted::HostedModel;
pub use local::{LocalModel, LOCAL_MAX_TOKENS};
pub use registry::RegistryModel;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ConvertError, ProviderError};
use crate::pipeline::encode::EncodedImage;
use crate::prompts::Prompt;
use async_trait::async_trait;
use std::sync::Arc;

/// Sampling options for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// What the model returned for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// The model stopped because it hit its output-token limit.
    pub truncated: bool,
}

/// A multimodal model that turns a page image into text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider name used in logs and error messages (`openai`, `ollama`, …).
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Small local models get the compact prompt and repetition cleanup.
    fn is_local(&self) -> bool {
        false
    }

    /// Transcribe one page. Returns [`ProviderError::EmptyResponse`] when the
    /// model answers with no text.
    async fn transcribe(
        &self,
        image: &EncodedImage,
        prompt: &Prompt,
        options: &CallOptions,
    ) -> Result<Transcription, ProviderError>;
}

/// Build the client described by `config`.
///
/// `timeout_secs` bounds each HTTP request; the pipeline enforces the same
/// bound again around the whole call.
pub fn create_model(
    config: &ProviderConfig,
    timeout_secs: u64,
) -> Result<Arc<dyn VisionModel>, ConvertError> {
    let model: Arc<dyn VisionModel> = match &config.kind {
        ProviderKind::OpenAi => Arc::new(HostedModel::new(config, timeout_secs)?),
        ProviderKind::Ollama => Arc::new(LocalModel::new(config, timeout_secs)?),
        ProviderKind::Named(name) => Arc::new(RegistryModel::new(name, config.model.as_deref())?),
    };
    tracing::info!("Using {} model '{}'", model.name(), model.model());
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_without_key_is_not_configured() {
        let err = create_model(&ProviderConfig::default(), 30).err().unwrap();
        match err {
            ConvertError::ProviderNotConfigured { provider, hint } => {
                assert_eq!(provider, "openai");
                assert!(hint.contains("OPENAI_API_KEY"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn local_needs_no_key() {
        let model = create_model(&ProviderConfig::ollama(), 30).unwrap();
        assert_eq!(model.name(), "ollama");
        assert!(model.is_local());
        assert_eq!(model.model(), crate::config::DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn hosted_with_key() {
        let config = ProviderConfig::openai("sk-test").with_model("gpt-4o");
        let model = create_model(&config, 30).unwrap();
        assert_eq!(model.name(), "openai");
        assert_eq!(model.model(), "gpt-4o");
        assert!(!model.is_local());
    }

    #[test]
    fn named_provider_requires_model() {
        let config = ProviderConfig {
            kind: ProviderKind::Named("anthropic".into()),
            ..ProviderConfig::default()
        };
        let err = create_model(&config, 30).err().unwrap();
        assert!(matches!(err, ConvertError::ProviderNotConfigured { .. }));
    }
}
