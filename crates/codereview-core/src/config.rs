use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config as cfg;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::AnalysisLimits;

pub const ENV_PREFIX: &str = "CODEREVIEW";

/// Upper bound on retries after the first inference attempt.
pub const MAX_INFERENCE_RETRIES: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "AnalysisConfig::default_max_code_length")]
    pub max_code_length: usize,
    /// Disabling the metrics engine leaves `metrics` out of every result.
    #[serde(default = "AnalysisConfig::default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl AnalysisConfig {
    fn default_max_code_length() -> usize {
        AnalysisLimits::default().max_code_length
    }

    fn default_metrics_enabled() -> bool {
        true
    }

    pub fn limits(&self) -> AnalysisLimits {
        AnalysisLimits {
            max_code_length: self.max_code_length,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_code_length: Self::default_max_code_length(),
            metrics_enabled: Self::default_metrics_enabled(),
        }
    }
}

/// Settings for the external inference capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// "anthropic", "openai", "openai-compatible", "ollama", "lmstudio" or "rules"
    #[serde(default = "InferenceConfig::default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
    /// Caller-visible cap on the whole generator call, retries included.
    #[serde(default = "InferenceConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Timeout applied to each HTTP attempt.
    #[serde(default = "InferenceConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "InferenceConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "InferenceConfig::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "InferenceConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "InferenceConfig::default_max_tokens")]
    pub max_tokens: usize,
    /// Background availability probe period; 0 keeps health on last-known status only.
    #[serde(default)]
    pub health_probe_interval_secs: u64,
}

impl InferenceConfig {
    fn default_provider() -> String {
        "anthropic".to_string()
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    fn default_request_timeout_secs() -> u64 {
        20
    }

    fn default_max_retries() -> u32 {
        MAX_INFERENCE_RETRIES
    }

    fn default_retry_base_delay_ms() -> u64 {
        500
    }

    fn default_temperature() -> f32 {
        0.1
    }

    fn default_max_tokens() -> usize {
        2048
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            model: None,
            base_url: None,
            api_key: None,
            timeout_secs: Self::default_timeout_secs(),
            request_timeout_secs: Self::default_request_timeout_secs(),
            max_retries: Self::default_max_retries(),
            retry_base_delay_ms: Self::default_retry_base_delay_ms(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
            health_probe_interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,
    #[serde(default = "HistoryConfig::default_path")]
    pub path: PathBuf,
    #[serde(default = "HistoryConfig::default_pool_size")]
    pub pool_size: usize,
}

impl HistoryConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("data/history.db")
    }

    fn default_pool_size() -> usize {
        8
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            path: Self::default_path(),
            pool_size: Self::default_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn,codereview_api=info,codereview_core=info,codereview_pipeline=info,tower_http=info".into(),
        }
    }
}

impl Settings {
    /// Layered load: default.toml, {env}.toml, local.toml, then CODEREVIEW__* variables.
    pub fn load(config_dir: &Path, env_name: &str) -> Result<Self> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Startup summary; call once a subscriber is installed.
    pub fn log_summary(&self, config_dir: &Path, env_name: &str) {
        info!(
            config_dir = %config_dir.display(),
            env = env_name,
            provider = %self.inference.provider,
            history = ?self.history.backend,
            listen = %format!("{}:{}", self.server.host, self.server.port),
            "Configuration loaded"
        );
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.analysis.max_code_length > 0,
            "analysis.max_code_length must be positive"
        );
        anyhow::ensure!(
            self.inference.timeout_secs > 0,
            "inference.timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.inference.request_timeout_secs > 0,
            "inference.request_timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.inference.max_retries <= MAX_INFERENCE_RETRIES,
            "inference.max_retries must be at most {}",
            MAX_INFERENCE_RETRIES
        );
        anyhow::ensure!(
            self.history.pool_size > 0,
            "history.pool_size must be positive"
        );
        Ok(())
    }
}
