use crate::llm_provider::*;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";

/// Settings for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub model: String,
    /// API root, overridable for proxies and tests
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()),
            model: DEFAULT_MODEL.to_string(),
            base_url: ANTHROPIC_API_BASE.to_string(),
            timeout_secs: 20,
        }
    }
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicProvider {
    /// A missing API key is reported by `has_credentials` and fails each
    /// request instead of construction.
    pub fn new(config: AnthropicConfig) -> LLMResult<Self> {
        if config.api_key.expose_secret().is_empty() {
            tracing::warn!("Anthropic API key is not set; requests will fail until ANTHROPIC_API_KEY is provided");
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
    ) -> LLMResult<AnthropicResponse> {
        if !self.has_credentials() {
            return Err(LLMError::Auth {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: "Anthropic API key is not configured; set ANTHROPIC_API_KEY".to_string(),
            });
        }

        let request = AnthropicRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .filter(|m| !matches!(m.role, MessageRole::System))
                .map(|m| AnthropicMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            system: messages
                .iter()
                .find(|m| matches!(m.role, MessageRole::System))
                .map(|m| m.content.clone()),
            max_tokens: config.max_tokens.unwrap_or(2048),
            temperature: Some(config.temperature),
            stop_sequences: config.stop.clone(),
        };

        let response = self
            .client
            .post(format!(
                "{}/messages",
                self.config.base_url.trim_end_matches('/')
            ))
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(LLMError::from_status(status, error_text));
        }

        response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| LLMError::Format(format!("Failed to parse Anthropic API response: {}", e)))
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let response = self.send_request(messages, config).await?;

        let content = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(LLMResponse {
            content,
            total_tokens: response
                .usage
                .map(|u| u.input_tokens + u.output_tokens),
            finish_reason: response.stop_reason,
            model: response.model,
        })
    }

    fn has_credentials(&self) -> bool {
        !self.config.api_key.expose_secret().is_empty()
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_fails_requests() {
        let config = AnthropicConfig {
            api_key: SecretString::from(String::new()),
            ..Default::default()
        };
        let provider = AnthropicProvider::new(config).unwrap();
        assert!(!provider.has_credentials());

        let result = provider.generate("hello").await;
        assert!(matches!(result, Err(LLMError::Auth { status: 401, .. })));

        let err = codereview_core::ReviewError::from(result.unwrap_err());
        assert!(matches!(
            err,
            codereview_core::ReviewError::Upstream {
                kind: codereview_core::UpstreamKind::Auth,
                ..
            }
        ));
    }

    #[test]
    fn test_provider_reports_credentials() {
        let config = AnthropicConfig {
            api_key: SecretString::from("test-key".to_string()),
            ..Default::default()
        };
        let provider = AnthropicProvider::new(config).unwrap();
        assert!(provider.has_credentials());
        assert_eq!(provider.provider_name(), "anthropic");
        assert_eq!(provider.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_response_text_blocks_are_joined() {
        let body = r#"{
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "[\"a\","}, {"type": "text", "text": "\"b\"]"}],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect();
        assert_eq!(text, "[\"a\",\"b\"]");
    }
}
