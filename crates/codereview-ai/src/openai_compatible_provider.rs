use crate::llm_provider::*;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OLLAMA_API_BASE: &str = "http://localhost:11434/v1";
pub const LM_STUDIO_API_BASE: &str = "http://localhost:1234/v1";

/// Endpoint settings for any server implementing `/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleConfig {
    /// API root without the `/chat/completions` suffix
    pub base_url: String,
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Sent as a bearer token when present
    pub api_key: Option<SecretString>,
    /// Whether requests are refused without an API key
    pub requires_api_key: bool,
    /// Reported in logs, health details and the generator name
    pub provider_name: String,
}

impl Default for OpenAICompatibleConfig {
    fn default() -> Self {
        Self {
            base_url: LM_STUDIO_API_BASE.to_string(),
            model: "local-model".to_string(),
            timeout_secs: 20,
            api_key: None,
            requires_api_key: false,
            provider_name: "openai-compatible".to_string(),
        }
    }
}

impl OpenAICompatibleConfig {
    /// Hosted OpenAI; always needs a key.
    pub fn openai(model: String, api_key: Option<SecretString>) -> Self {
        Self {
            base_url: OPENAI_API_BASE.to_string(),
            model,
            api_key,
            requires_api_key: true,
            provider_name: "openai".to_string(),
            ..Default::default()
        }
    }

    /// Local LM Studio server, no key.
    pub fn lm_studio(model: String) -> Self {
        Self {
            base_url: LM_STUDIO_API_BASE.to_string(),
            model,
            provider_name: "lmstudio".to_string(),
            ..Default::default()
        }
    }

    /// Local Ollama through its OpenAI-style endpoint.
    pub fn ollama(model: String) -> Self {
        Self {
            base_url: OLLAMA_API_BASE.to_string(),
            model,
            provider_name: "ollama".to_string(),
            ..Default::default()
        }
    }

    pub fn custom(base_url: String, model: String, provider_name: String) -> Self {
        Self {
            base_url,
            model,
            provider_name,
            ..Default::default()
        }
    }
}

/// OpenAI-compatible LLM provider speaking the Chat Completions API
pub struct OpenAICompatibleProvider {
    config: OpenAICompatibleConfig,
    client: Client,
}

impl OpenAICompatibleProvider {
    pub fn new(config: OpenAICompatibleConfig) -> LLMResult<Self> {
        if config.requires_api_key && config.api_key.is_none() {
            tracing::warn!(
                "{} API key is not set; requests will fail until one is configured",
                config.provider_name
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LLMError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    async fn send_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<ChatCompletionsResponse> {
        if !self.has_credentials() {
            return Err(LLMError::Auth {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: format!("{} API key is not configured", self.config.provider_name),
            });
        }

        let request = ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: Some(config.temperature),
            max_tokens: config.max_tokens,
            stop: config.stop.clone(),
        };

        let mut request_builder = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .header("Content-Type", "application/json")
            .json(&request);

        if let Some(api_key) = &self.config.api_key {
            request_builder = request_builder.header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            );
        }

        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(LLMError::from_status(status, error_text));
        }

        response.json().await.map_err(|e| {
            LLMError::Format(format!(
                "Failed to parse {} Chat Completions API response: {}",
                self.config.provider_name, e
            ))
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let response = self.send_request(messages, config).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Format("No choices in response".to_string()))?;

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            total_tokens: response.usage.map(|u| u.total_tokens),
            finish_reason: choice.finish_reason,
            model: response.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }

    fn has_credentials(&self) -> bool {
        !self.config.requires_api_key
            || self
                .config
                .api_key
                .as_ref()
                .map(|key| !key.expose_secret().is_empty())
                .unwrap_or(false)
    }

    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Chat Completions API types

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: usize,
}
