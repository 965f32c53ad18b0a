//! End-to-end pipeline behaviour with scripted generators and stores

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codereview_ai::{GenerationError, LLMError, RuleBasedGenerator, SuggestionGenerator};
use codereview_core::{
    AnalysisId, AnalysisRecord, AnalysisRequest, AnalysisSettings, HistoryEntry, HistoryPage,
    HistoryQuery, HistoryStats, ReviewError, StoredAnalysis, Suggestion, UpstreamKind,
};
use codereview_history::{HistoryError, HistoryResult, HistoryStore, InMemoryHistoryStore};
use codereview_pipeline::{AnalysisPipeline, InferenceState, PipelineConfig};

enum Behaviour {
    Suggest(usize),
    Hang,
    Fail(fn() -> LLMError),
    Garbage,
}

struct StubGenerator {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl StubGenerator {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SuggestionGenerator for StubGenerator {
    async fn generate(
        &self,
        _code: &str,
        _settings: &AnalysisSettings,
        _limit: usize,
    ) -> Result<Vec<Suggestion>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            // Ignores the limit on purpose; the pipeline must still cap it.
            Behaviour::Suggest(n) => Ok((0..*n)
                .map(|i| Suggestion::new(format!("suggestion {}", i)))
                .collect()),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Behaviour::Fail(make) => Err(GenerationError::Provider(make())),
            Behaviour::Garbage => Err(GenerationError::Format("not a list".into())),
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl HistoryStore for BrokenStore {
    async fn append(&self, _record: &AnalysisRecord) -> HistoryResult<HistoryEntry> {
        Err(HistoryError::Unavailable("disk full".into()))
    }

    async fn list(&self, _query: HistoryQuery) -> HistoryResult<HistoryPage> {
        Err(HistoryError::Unavailable("disk full".into()))
    }

    async fn get(&self, _id: AnalysisId) -> HistoryResult<Option<StoredAnalysis>> {
        Err(HistoryError::Unavailable("disk full".into()))
    }

    async fn stats(&self) -> HistoryResult<HistoryStats> {
        Err(HistoryError::Unavailable("disk full".into()))
    }

    async fn ping(&self) -> HistoryResult<()> {
        Err(HistoryError::Unavailable("disk full".into()))
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

fn pipeline(
    generator: Arc<dyn SuggestionGenerator>,
    store: Arc<dyn HistoryStore>,
) -> AnalysisPipeline {
    let config = PipelineConfig {
        inference_timeout: Duration::from_millis(200),
        ..PipelineConfig::default()
    };
    AnalysisPipeline::new(config, generator, store)
}

fn request(code: &str, max: u32) -> AnalysisRequest {
    AnalysisRequest::new(code, true, true, max)
}

#[tokio::test]
async fn hello_world_analysis() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let pipeline = pipeline(StubGenerator::new(Behaviour::Suggest(2)), store.clone());

    let outcome = pipeline.analyze(&request("print('hi')", 5)).await.unwrap();
    let metrics = outcome.result.metrics.clone().unwrap();
    assert_eq!(metrics.lines_of_code, 1);
    assert_eq!(metrics.cyclomatic_complexity, 1);
    assert!(metrics.maintainability_index >= 80.0);
    assert_eq!(metrics.code_coverage_estimate, 0.0);
    assert!(outcome.result.suggestions.len() <= 5);
    assert_eq!(
        outcome.result.summary,
        "Found 2 suggestion(s) for improvement."
    );

    let entry = outcome.history.unwrap();
    assert_eq!(entry.id, outcome.result.analysis_id);
    assert_eq!(entry.suggestions_count, 2);
    assert_eq!(store.len(), 1);
    assert_eq!(
        pipeline.inference_health().snapshot().state,
        InferenceState::Available
    );
}

#[tokio::test]
async fn suggestions_never_exceed_the_requested_maximum() {
    let generator = StubGenerator::new(Behaviour::Suggest(30));
    let pipeline = pipeline(generator, Arc::new(InMemoryHistoryStore::new()));

    for max in [1, 3, 20] {
        let outcome = pipeline.analyze(&request("x = 1", max)).await.unwrap();
        assert_eq!(outcome.result.suggestions.len(), max as usize);
    }
}

#[tokio::test]
async fn empty_snippet_is_rejected_before_any_work() {
    let generator = StubGenerator::new(Behaviour::Suggest(1));
    let store = Arc::new(InMemoryHistoryStore::new());
    let pipeline = pipeline(generator.clone(), store.clone());

    for code in ["", "   \n\t"] {
        let err = pipeline.analyze(&request(code, 5)).await.unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }
    let err = pipeline.analyze(&request("x = 1", 0)).await.unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)));

    assert_eq!(generator.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn timeout_produces_upstream_error_and_no_history() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let pipeline = pipeline(StubGenerator::new(Behaviour::Hang), store.clone());

    let err = pipeline.analyze(&request("x = 1", 5)).await.unwrap_err();
    assert!(matches!(
        err,
        ReviewError::Upstream {
            kind: UpstreamKind::Timeout,
            ..
        }
    ));
    assert!(store.is_empty());

    let health = pipeline.inference_health().snapshot();
    assert_eq!(health.state, InferenceState::Unavailable);
    assert_eq!(health.consecutive_failures, 1);
}

#[tokio::test]
async fn quota_failure_is_an_upstream_error() {
    let generator = StubGenerator::new(Behaviour::Fail(|| LLMError::Quota {
        status: 429,
        message: "quota exceeded".into(),
    }));
    let store = Arc::new(InMemoryHistoryStore::new());
    let pipeline = pipeline(generator.clone(), store.clone());

    let err = pipeline.analyze(&request("x = 1", 5)).await.unwrap_err();
    assert!(matches!(
        err,
        ReviewError::Upstream {
            kind: UpstreamKind::Quota,
            ..
        }
    ));
    assert_eq!(generator.calls(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn unparsable_output_is_a_format_error() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let pipeline = pipeline(StubGenerator::new(Behaviour::Garbage), store.clone());

    let err = pipeline.analyze(&request("x = 1", 5)).await.unwrap_err();
    assert!(matches!(err, ReviewError::UpstreamFormat(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn persistence_failure_still_returns_the_result() {
    let pipeline = pipeline(
        StubGenerator::new(Behaviour::Suggest(1)),
        Arc::new(BrokenStore),
    );

    let outcome = pipeline.analyze(&request("x = 1", 5)).await.unwrap();
    assert!(!outcome.history_persisted());
    assert!(matches!(outcome.history, Err(ReviewError::Persistence(_))));
    assert_eq!(outcome.result.suggestions.len(), 1);
}

#[tokio::test]
async fn disabled_metrics_are_omitted() {
    let config = PipelineConfig {
        metrics_enabled: false,
        ..PipelineConfig::default()
    };
    let pipeline = AnalysisPipeline::new(
        config,
        StubGenerator::new(Behaviour::Suggest(0)),
        Arc::new(InMemoryHistoryStore::new()),
    );

    let outcome = pipeline.analyze(&request("x = 1", 5)).await.unwrap();
    assert!(outcome.result.metrics.is_none());
    assert_eq!(
        outcome.result.summary,
        "Code looks good! No major issues found."
    );
}

#[tokio::test]
async fn each_analysis_gets_a_fresh_id() {
    let store = Arc::new(InMemoryHistoryStore::new());
    let pipeline = pipeline(StubGenerator::new(Behaviour::Suggest(1)), store.clone());

    let a = pipeline.analyze(&request("x = 1", 5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    let b = pipeline.analyze(&request("x = 1", 5)).await.unwrap();
    assert_ne!(a.result.analysis_id, b.result.analysis_id);

    let page = store.list(HistoryQuery::default()).await.unwrap();
    assert_eq!(page.history.len(), 2);
    assert_eq!(page.history[0].id, b.result.analysis_id);
}

#[tokio::test]
async fn rule_based_generator_runs_offline() {
    let pipeline = pipeline(
        Arc::new(RuleBasedGenerator::new()),
        Arc::new(InMemoryHistoryStore::new()),
    );

    let code = "import os\n\ndef Compute(a):\n    return eval(a)\n";
    let outcome = pipeline.analyze(&request(code, 2)).await.unwrap();
    assert_eq!(outcome.result.suggestions.len(), 2);
    assert!(outcome.result.suggestions[0].as_str().contains("eval()"));
}
