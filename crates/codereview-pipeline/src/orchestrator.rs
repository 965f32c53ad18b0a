use chrono::{SubsecRound, Utc};
use codereview_ai::SuggestionGenerator;
use codereview_core::{
    AnalysisLimits, AnalysisRecord, AnalysisRequest, AnalysisResult, AnalysisSettings,
    HistoryEntry, Metrics, Result, ReviewError, Settings, Suggestion, UpstreamKind,
};
use codereview_history::HistoryStore;
use codereview_metrics::MetricsEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::health::InferenceHealth;

/// Complexity above which the summary recommends refactoring.
const COMPLEXITY_NOTE_THRESHOLD: u32 = 10;
/// Maintainability below which the summary recommends refactoring.
const MAINTAINABILITY_NOTE_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub limits: AnalysisLimits,
    pub metrics_enabled: bool,
    /// Hard cap on the whole generator call, retries included.
    pub inference_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: AnalysisLimits::default(),
            metrics_enabled: true,
            inference_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            limits: settings.analysis.limits(),
            metrics_enabled: settings.analysis.metrics_enabled,
            inference_timeout: Duration::from_secs(settings.inference.timeout_secs),
        }
    }
}

/// A completed analysis. Persistence has its own failure channel: the
/// result is valid even when `history` is an error.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub history: std::result::Result<HistoryEntry, ReviewError>,
}

impl AnalysisOutcome {
    pub fn history_persisted(&self) -> bool {
        self.history.is_ok()
    }
}

pub struct AnalysisPipeline {
    config: PipelineConfig,
    metrics: MetricsEngine,
    generator: Arc<dyn SuggestionGenerator>,
    history: Arc<dyn HistoryStore>,
    inference_health: Arc<InferenceHealth>,
}

impl AnalysisPipeline {
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn SuggestionGenerator>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            metrics: MetricsEngine::new(),
            generator,
            history,
            inference_health: Arc::new(InferenceHealth::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn generator(&self) -> &Arc<dyn SuggestionGenerator> {
        &self.generator
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn inference_health(&self) -> &Arc<InferenceHealth> {
        &self.inference_health
    }

    /// Validate, run metrics and suggestion generation concurrently, then
    /// record the result. Nothing reaches history unless both stages succeed.
    #[instrument(skip_all, fields(analysis_id = tracing::field::Empty))]
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let settings = request.validate(&self.config.limits)?;
        let start = Instant::now();
        let analysis_id = Uuid::new_v4();
        tracing::Span::current().record("analysis_id", tracing::field::display(analysis_id));

        let code: Arc<str> = Arc::from(request.code_snippet());
        let (metrics, suggestions) = tokio::join!(
            self.compute_metrics(Arc::clone(&code)),
            self.generate_suggestions(&code, &settings)
        );
        let mut suggestions = suggestions?;
        suggestions.truncate(settings.max_suggestions);

        let summary = build_summary(&suggestions, metrics.as_ref());
        let result = AnalysisResult {
            analysis_id,
            summary,
            metrics,
            suggestions,
            processing_time_ms: start.elapsed().as_millis() as u64,
            // Storage keeps microsecond precision.
            created_at: Utc::now().trunc_subsecs(6),
        };

        let record = AnalysisRecord::new(result.clone(), request.code_snippet());
        let history = self
            .history
            .append(&record)
            .await
            .map_err(ReviewError::from);
        if let Err(e) = &history {
            warn!(
                backend = self.history.backend(),
                error = %e,
                "Analysis completed but was not recorded in history"
            );
        }

        info!(
            suggestions = result.suggestions.len(),
            processing_time_ms = result.processing_time_ms,
            history_persisted = history.is_ok(),
            "Analysis completed"
        );
        Ok(AnalysisOutcome { result, history })
    }

    async fn compute_metrics(&self, code: Arc<str>) -> Option<Metrics> {
        if !self.config.metrics_enabled {
            return None;
        }
        let engine = self.metrics;
        match tokio::task::spawn_blocking(move || engine.compute(&code)).await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, "Metrics computation failed; returning result without metrics");
                None
            }
        }
    }

    async fn generate_suggestions(
        &self,
        code: &str,
        settings: &AnalysisSettings,
    ) -> Result<Vec<Suggestion>> {
        let timeout = self.config.inference_timeout;
        let call = self
            .generator
            .generate(code, settings, settings.max_suggestions);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(suggestions)) => {
                self.inference_health.record_success();
                debug!(count = suggestions.len(), "Suggestions generated");
                Ok(suggestions)
            }
            Ok(Err(e)) => {
                let err = ReviewError::from(e);
                match &err {
                    // The provider answered; only its content was unusable.
                    ReviewError::UpstreamFormat(_) => self.inference_health.record_success(),
                    other => self.inference_health.record_failure(other.to_string()),
                }
                warn!(generator = self.generator.name(), error = %err, "Suggestion generation failed");
                Err(err)
            }
            Err(_) => {
                let err = ReviewError::upstream(
                    UpstreamKind::Timeout,
                    format!(
                        "inference did not complete within {}s",
                        timeout.as_secs_f64()
                    ),
                );
                self.inference_health.record_failure(err.to_string());
                warn!(generator = self.generator.name(), "Suggestion generation timed out");
                Err(err)
            }
        }
    }
}

/// Deterministic one-line summary of a result.
pub fn build_summary(suggestions: &[Suggestion], metrics: Option<&Metrics>) -> String {
    if suggestions.is_empty() {
        return "Code looks good! No major issues found.".to_string();
    }

    let mut summary = format!(
        "Found {} suggestion(s) for improvement.",
        suggestions.len()
    );
    if let Some(m) = metrics {
        if m.cyclomatic_complexity > COMPLEXITY_NOTE_THRESHOLD
            || m.maintainability_index < MAINTAINABILITY_NOTE_THRESHOLD
        {
            summary.push_str(&format!(
                " High complexity (cyclomatic {}, maintainability {:.1}); consider refactoring.",
                m.cyclomatic_complexity, m.maintainability_index
            ));
        }
    }
    summary
}
