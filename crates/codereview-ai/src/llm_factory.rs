use crate::anthropic_provider::{AnthropicConfig, AnthropicProvider};
use crate::generator::{LlmSuggestionGenerator, RetryPolicy, SuggestionGenerator};
use crate::llm_provider::*;
use crate::openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use crate::rules::RuleBasedGenerator;
use codereview_core::InferenceConfig;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

/// Provider name selecting the offline rule-based generator.
pub const RULES_PROVIDER: &str = "rules";

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create the suggestion generator described by the inference settings.
    pub fn create_generator(config: &InferenceConfig) -> LLMResult<Arc<dyn SuggestionGenerator>> {
        if config.provider.eq_ignore_ascii_case(RULES_PROVIDER) {
            return Ok(Arc::new(RuleBasedGenerator::new()));
        }

        let provider = Self::create_from_config(config)?;
        let retry = RetryPolicy::new(
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        );
        let generation = GenerationConfig {
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            stop: None,
        };

        Ok(Arc::new(LlmSuggestionGenerator::new(
            provider, retry, generation,
        )))
    }

    /// Create an LLM provider from configuration
    pub fn create_from_config(config: &InferenceConfig) -> LLMResult<Arc<dyn LLMProvider>> {
        let provider_name = config.provider.to_lowercase();

        match provider_name.as_str() {
            "anthropic" => Self::create_anthropic_provider(config),
            "openai" => Self::create_openai_provider(config),
            "ollama" => Self::create_local_provider(
                config,
                OpenAICompatibleConfig::ollama(
                    config
                        .model
                        .clone()
                        .unwrap_or_else(|| "qwen2.5-coder:14b".to_string()),
                ),
            ),
            "lmstudio" => Self::create_local_provider(
                config,
                OpenAICompatibleConfig::lm_studio(
                    config
                        .model
                        .clone()
                        .unwrap_or_else(|| "local-model".to_string()),
                ),
            ),
            "openai-compatible" => Self::create_openai_compatible_provider(config),
            _ => Err(LLMError::Config(format!(
                "Unsupported LLM provider: {}. Available providers: anthropic, openai, \
                 openai-compatible, ollama, lmstudio, rules",
                provider_name
            ))),
        }
    }

    /// Create an Anthropic Claude provider
    fn create_anthropic_provider(config: &InferenceConfig) -> LLMResult<Arc<dyn LLMProvider>> {
        let anthropic_config = AnthropicConfig {
            api_key: api_key_or_env(config, "ANTHROPIC_API_KEY")
                .unwrap_or_else(|| SecretString::from(String::new())),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| crate::anthropic_provider::DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| crate::anthropic_provider::ANTHROPIC_API_BASE.to_string()),
            timeout_secs: config.request_timeout_secs,
        };

        Ok(Arc::new(AnthropicProvider::new(anthropic_config)?))
    }

    /// Create an OpenAI provider
    fn create_openai_provider(config: &InferenceConfig) -> LLMResult<Arc<dyn LLMProvider>> {
        let mut openai_config = OpenAICompatibleConfig::openai(
            config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key_or_env(config, "OPENAI_API_KEY"),
        );
        if let Some(base_url) = &config.base_url {
            openai_config.base_url = base_url.clone();
        }
        openai_config.timeout_secs = config.request_timeout_secs;

        Ok(Arc::new(OpenAICompatibleProvider::new(openai_config)?))
    }

    /// Ollama and LM Studio; no key required
    fn create_local_provider(
        config: &InferenceConfig,
        mut local_config: OpenAICompatibleConfig,
    ) -> LLMResult<Arc<dyn LLMProvider>> {
        if let Some(base_url) = &config.base_url {
            local_config.base_url = base_url.clone();
        }
        local_config.api_key = config.api_key.clone();
        local_config.timeout_secs = config.request_timeout_secs;

        Ok(Arc::new(OpenAICompatibleProvider::new(local_config)?))
    }

    /// Create a generic OpenAI-compatible provider
    fn create_openai_compatible_provider(
        config: &InferenceConfig,
    ) -> LLMResult<Arc<dyn LLMProvider>> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            LLMError::Config(
                "OpenAI-compatible provider requires 'inference.base_url' to be set".to_string(),
            )
        })?;

        let mut compat_config = OpenAICompatibleConfig::custom(
            base_url,
            config
                .model
                .clone()
                .unwrap_or_else(|| "local-model".to_string()),
            "openai-compatible".to_string(),
        );
        compat_config.api_key = config.api_key.clone();
        compat_config.timeout_secs = config.request_timeout_secs;

        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }
}

fn api_key_or_env(config: &InferenceConfig, var: &str) -> Option<SecretString> {
    config.api_key.clone().or_else(|| {
        std::env::var(var)
            .ok()
            .filter(|key| !key.is_empty())
            .map(SecretString::from)
    })
}
