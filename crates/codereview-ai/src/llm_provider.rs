use async_trait::async_trait;
use codereview_core::{ReviewError, UpstreamKind};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for LLM operations
pub type LLMResult<T> = std::result::Result<T, LLMError>;

/// Failure of a single provider call, classified for the retry policy.
#[derive(Error, Debug)]
pub enum LLMError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("quota exhausted ({status}): {message}")]
    Quota { status: u16, message: String },

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    Format(String),

    #[error("provider misconfigured: {0}")]
    Config(String),
}

impl LLMError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let code = status.as_u16();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LLMError::Auth {
                status: code,
                message: body,
            },
            StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => LLMError::Quota {
                status: code,
                message: body,
            },
            s if s.is_client_error() && body.to_lowercase().contains("quota") => {
                LLMError::Quota {
                    status: code,
                    message: body,
                }
            }
            _ => LLMError::Status {
                status: code,
                message: body,
            },
        }
    }

    /// Worth another attempt: connectivity, timeouts, 408 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            LLMError::Network(_) | LLMError::Timeout(_) => true,
            LLMError::Status { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LLMError::Timeout(err.to_string())
        } else if err.is_decode() {
            LLMError::Format(err.to_string())
        } else {
            LLMError::Network(err.to_string())
        }
    }
}

impl From<LLMError> for ReviewError {
    fn from(err: LLMError) -> Self {
        let message = err.to_string();
        match err {
            LLMError::Network(_) => ReviewError::upstream(UpstreamKind::Network, message),
            LLMError::Timeout(_) => ReviewError::upstream(UpstreamKind::Timeout, message),
            LLMError::Auth { .. } => ReviewError::upstream(UpstreamKind::Auth, message),
            LLMError::Quota { .. } => ReviewError::upstream(UpstreamKind::Quota, message),
            LLMError::Status { .. } => ReviewError::upstream(UpstreamKind::Status, message),
            LLMError::Format(_) => ReviewError::UpstreamFormat(message),
            LLMError::Config(_) => ReviewError::Config(message),
        }
    }
}

/// Configuration for generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature for sampling (0.0 to 2.0)
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: Some(2048),
            stop: None,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Response from the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Generated text content
    pub content: String,
    /// Total tokens used in the request
    pub total_tokens: Option<usize>,
    /// Finish reason (e.g., "stop", "length")
    pub finish_reason: Option<String>,
    /// Model used for generation
    pub model: String,
}

/// Main trait for LLM providers. Implementations make exactly one attempt
/// per call; retrying is the caller's decision.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str) -> LLMResult<LLMResponse> {
        self.generate_chat(&[Message::user(prompt)], &GenerationConfig::default())
            .await
    }

    /// Generate a chat completion with message history
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse>;

    /// Check if the provider is available and ready. Costs a real request.
    async fn is_available(&self) -> bool {
        let config = GenerationConfig {
            max_tokens: Some(1),
            ..GenerationConfig::default()
        };
        self.generate_chat(&[Message::user("ping")], &config)
            .await
            .is_ok()
    }

    /// Whether credentials required by this provider are present.
    fn has_credentials(&self) -> bool;

    /// Get the name of this provider
    fn provider_name(&self) -> &str;

    /// Get the model identifier
    fn model_name(&self) -> &str;
}
