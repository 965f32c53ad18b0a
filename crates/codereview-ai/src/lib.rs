pub mod anthropic_provider;
pub mod generator;
pub mod llm_factory;
pub mod llm_provider;
pub mod openai_compatible_provider;
pub mod parser;
pub mod prompts;
pub mod rules;

pub use anthropic_provider::{AnthropicConfig, AnthropicProvider};
pub use generator::{GenerationError, LlmSuggestionGenerator, RetryPolicy, SuggestionGenerator};
pub use llm_factory::{LLMProviderFactory, RULES_PROVIDER};
pub use llm_provider::{
    GenerationConfig, LLMError, LLMProvider, LLMResponse, LLMResult, Message, MessageRole,
};
pub use openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use parser::parse_suggestions;
pub use prompts::build_review_prompt;
pub use rules::RuleBasedGenerator;
