use async_trait::async_trait;
use codereview_core::{AnalysisSettings, ReviewError, Suggestion};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm_provider::{GenerationConfig, LLMError, LLMProvider, LLMResponse, Message};
use crate::parser::parse_suggestions;
use crate::prompts::{build_review_prompt, REVIEW_SYSTEM_PROMPT};

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] LLMError),

    #[error("unusable model response: {0}")]
    Format(String),
}

impl From<GenerationError> for ReviewError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Provider(e) => e.into(),
            GenerationError::Format(message) => ReviewError::UpstreamFormat(message),
        }
    }
}

/// Produces review suggestions for a snippet.
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    /// At most `limit` suggestions, most important first.
    async fn generate(
        &self,
        code: &str,
        settings: &AnalysisSettings,
        limit: usize,
    ) -> Result<Vec<Suggestion>, GenerationError>;

    /// Identifier reported by health and status endpoints.
    fn name(&self) -> &str;

    fn credentials_configured(&self) -> bool {
        true
    }

    /// Active reachability check. May cost a real inference request.
    async fn probe(&self) -> bool {
        true
    }
}

/// Backoff schedule for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Suggestion generator backed by an LLM provider.
pub struct LlmSuggestionGenerator {
    provider: Arc<dyn LLMProvider>,
    retry: RetryPolicy,
    generation: GenerationConfig,
    name: String,
}

impl LlmSuggestionGenerator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        retry: RetryPolicy,
        generation: GenerationConfig,
    ) -> Self {
        let name = format!("{}/{}", provider.provider_name(), provider.model_name());
        Self {
            provider,
            retry,
            generation,
            name,
        }
    }

    async fn complete_with_retry(&self, messages: &[Message]) -> Result<LLMResponse, LLMError> {
        let mut retries = 0;
        loop {
            match self.provider.generate_chat(messages, &self.generation).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && retries < self.retry.max_retries => {
                    retries += 1;
                    let delay = self.retry.delay_for(retries);
                    warn!(
                        provider = self.provider.provider_name(),
                        retry = retries,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Inference request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl SuggestionGenerator for LlmSuggestionGenerator {
    async fn generate(
        &self,
        code: &str,
        settings: &AnalysisSettings,
        limit: usize,
    ) -> Result<Vec<Suggestion>, GenerationError> {
        let start = Instant::now();
        let messages = [
            Message::system(REVIEW_SYSTEM_PROMPT),
            Message::user(build_review_prompt(code, settings, limit)),
        ];

        let response = self.complete_with_retry(&messages).await?;
        let mut suggestions = parse_suggestions(&response.content)?;
        suggestions.truncate(limit);

        info!(
            provider = self.provider.provider_name(),
            model = %response.model,
            suggestions = suggestions.len(),
            tokens = ?response.total_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generated suggestions"
        );
        debug!(finish_reason = ?response.finish_reason, "Inference response details");

        Ok(suggestions)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn credentials_configured(&self) -> bool {
        self.provider.has_credentials()
    }

    async fn probe(&self) -> bool {
        self.provider.is_available().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_provider::LLMResult;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted results and counts calls.
    struct ScriptedProvider {
        script: Mutex<VecDeque<LLMResult<String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<LLMResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn generate_chat(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> LLMResult<LLMResponse> {
            *self.calls.lock().unwrap() += 1;
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LLMError::Network("script exhausted".into())));
            next.map(|content| LLMResponse {
                content,
                total_tokens: None,
                finish_reason: Some("stop".into()),
                model: "scripted".into(),
            })
        }

        fn has_credentials(&self) -> bool {
            true
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn settings() -> AnalysisSettings {
        AnalysisSettings {
            performance: true,
            security: true,
            max_suggestions: 3,
        }
    }

    fn generator(provider: Arc<ScriptedProvider>) -> LlmSuggestionGenerator {
        LlmSuggestionGenerator::new(
            provider,
            RetryPolicy::new(2, Duration::from_millis(1)),
            GenerationConfig::default(),
        )
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn suggestions_are_truncated_to_limit() {
        let provider = ScriptedProvider::new(vec![Ok(r#"["a", "b", "c", "d", "e"]"#.into())]);
        let result = generator(provider.clone())
            .generate("x = 1", &settings(), 3)
            .await
            .unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].as_str(), "a");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(LLMError::Network("reset".into())),
            Err(LLMError::Status {
                status: 503,
                message: "busy".into(),
            }),
            Ok(r#"["ok"]"#.into()),
        ]);
        let result = generator(provider.clone())
            .generate("x = 1", &settings(), 3)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn retries_stop_after_max() {
        let provider = ScriptedProvider::new(vec![
            Err(LLMError::Timeout("1".into())),
            Err(LLMError::Timeout("2".into())),
            Err(LLMError::Timeout("3".into())),
            Ok(r#"["never reached"]"#.into()),
        ]);
        let err = generator(provider.clone())
            .generate("x = 1", &settings(), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Provider(LLMError::Timeout(_))
        ));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn quota_is_not_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(LLMError::Quota {
                status: 429,
                message: "quota exceeded".into(),
            }),
            Ok(r#"["never reached"]"#.into()),
        ]);
        let err = generator(provider.clone())
            .generate("x = 1", &settings(), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Provider(LLMError::Quota { .. })
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn unparsable_output_is_not_retried() {
        let provider = ScriptedProvider::new(vec![
            Ok("I cannot review this.".into()),
            Ok(r#"["never reached"]"#.into()),
        ]);
        let err = generator(provider.clone())
            .generate("x = 1", &settings(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Format(_)));
        assert!(matches!(
            ReviewError::from(err),
            ReviewError::UpstreamFormat(_)
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn name_combines_provider_and_model() {
        let provider = ScriptedProvider::new(vec![]);
        assert_eq!(generator(provider).name(), "scripted/scripted");
    }
}
