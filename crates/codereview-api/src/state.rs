use anyhow::Context;
use codereview_ai::LLMProviderFactory;
use codereview_core::Settings;
use codereview_history::open_store;
use codereview_pipeline::{AnalysisPipeline, PipelineConfig};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<AnalysisPipeline>) -> Self {
        Self {
            pipeline,
            started_at: Instant::now(),
        }
    }

    /// Wire the generator and history backend selected in `settings`.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let generator = LLMProviderFactory::create_generator(&settings.inference)
            .context("creating suggestion generator")?;
        let history = open_store(&settings.history)
            .await
            .context("opening history store")?;

        tracing::info!(
            generator = generator.name(),
            history = history.backend(),
            "Analysis pipeline ready"
        );

        let pipeline = AnalysisPipeline::new(
            PipelineConfig::from_settings(settings),
            generator,
            history,
        );
        Ok(Self::new(Arc::new(pipeline)))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
