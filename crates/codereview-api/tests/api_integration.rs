use async_trait::async_trait;
use axum_test::TestServer;
use codereview_ai::{GenerationError, LLMError, SuggestionGenerator};
use codereview_api::{create_router, AppState};
use codereview_core::{
    AnalysisId, AnalysisRecord, AnalysisSettings, HistoryBackend, HistoryEntry, HistoryPage,
    HistoryQuery, HistoryStats, Settings, StoredAnalysis, Suggestion,
};
use codereview_history::{HistoryError, HistoryResult, HistoryStore, InMemoryHistoryStore};
use codereview_pipeline::{AnalysisPipeline, PipelineConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

enum Behaviour {
    Suggest(usize),
    Hang,
    Fail(fn() -> LLMError),
    Garbage,
}

struct StubGenerator {
    behaviour: Behaviour,
    credentials: bool,
}

impl StubGenerator {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            credentials: true,
        })
    }

    fn without_credentials() -> Arc<Self> {
        Arc::new(Self {
            behaviour: Behaviour::Suggest(0),
            credentials: false,
        })
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
        match &self.behaviour {
            Behaviour::Suggest(n) => Ok((0..*n)
                .map(|i| Suggestion::new(format!("Consider change {}", i)))
                .collect()),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Behaviour::Fail(make) => Err(GenerationError::Provider(make())),
            Behaviour::Garbage => Err(GenerationError::Format("no list found".into())),
        }
    }

    fn name(&self) -> &str {
        "stub/test"
    }

    fn credentials_configured(&self) -> bool {
        self.credentials
    }
}

struct BrokenStore;

#[async_trait]
impl HistoryStore for BrokenStore {
    async fn append(&self, _record: &AnalysisRecord) -> HistoryResult<HistoryEntry> {
        Err(HistoryError::Unavailable("database is locked".into()))
    }

    async fn list(&self, _query: HistoryQuery) -> HistoryResult<HistoryPage> {
        Err(HistoryError::Unavailable("database is locked".into()))
    }

    async fn get(&self, _id: AnalysisId) -> HistoryResult<Option<StoredAnalysis>> {
        Err(HistoryError::Unavailable("database is locked".into()))
    }

    async fn stats(&self) -> HistoryResult<HistoryStats> {
        Err(HistoryError::Unavailable("database is locked".into()))
    }

    async fn ping(&self) -> HistoryResult<()> {
        Err(HistoryError::Unavailable("database is locked".into()))
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

fn server_with(
    generator: Arc<dyn SuggestionGenerator>,
    history: Arc<dyn HistoryStore>,
) -> TestServer {
    let config = PipelineConfig {
        inference_timeout: Duration::from_millis(200),
        ..PipelineConfig::default()
    };
    let pipeline = AnalysisPipeline::new(config, generator, history);
    let state = AppState::new(Arc::new(pipeline));
    TestServer::new(create_router(state)).unwrap()
}

fn server(behaviour: Behaviour) -> TestServer {
    server_with(
        StubGenerator::new(behaviour),
        Arc::new(InMemoryHistoryStore::new()),
    )
}

fn analyze_body(code: &str, max: u32) -> Value {
    json!({
        "code_snippet": code,
        "include_performance_analysis": true,
        "include_security_analysis": true,
        "max_suggestions": max
    })
}

#[tokio::test]
async fn analyze_code_returns_result_and_records_history() {
    let server = server(Behaviour::Suggest(8));

    let resp = server
        .post("/analyze-code")
        .json(&analyze_body("print('hi')", 5))
        .await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 5);
    assert_eq!(body["metrics"]["lines_of_code"], 1);
    assert_eq!(body["metrics"]["cyclomatic_complexity"], 1);
    assert_eq!(body["history_persisted"], true);
    assert!(body.get("history_error").is_none());
    assert_eq!(body["agent_version"], env!("CARGO_PKG_VERSION"));
    let id = body["analysis_id"].as_str().unwrap().to_string();

    let resp = server.get("/analysis-history").await;
    assert_eq!(resp.status_code(), 200);
    let page: Value = resp.json();
    let history = page["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], id.as_str());
    assert_eq!(history[0]["suggestions_count"], 5);
    assert!(page["as_of"].as_i64().unwrap() > 0);

    let resp = server.get(&format!("/analysis-history/{}", id)).await;
    assert_eq!(resp.status_code(), 200);
    let stored: Value = resp.json();
    assert_eq!(stored["code_snippet"], "print('hi')");
    assert_eq!(stored["suggestions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn request_defaults_apply_when_fields_are_omitted() {
    let server = server(Behaviour::Suggest(30));

    let resp = server
        .post("/analyze-code")
        .json(&json!({ "code_snippet": "x = 1" }))
        .await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_validation_kind() {
    let server = server(Behaviour::Suggest(1));

    let cases = [
        analyze_body("", 5),
        analyze_body("   \n", 5),
        analyze_body("x = 1", 0),
        analyze_body("x = 1", 51),
        json!({ "max_suggestions": 5 }),
    ];
    for case in cases {
        let resp = server.post("/analyze-code").json(&case).await;
        assert_eq!(resp.status_code(), 400, "payload {}", case);
        let body: Value = resp.json();
        assert_eq!(body["kind"], "validation");
        assert_eq!(body["status"], 400);
    }

    let page: Value = server.get("/analysis-history").await.json();
    assert!(page["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn upstream_failures_map_to_gateway_errors() {
    let quota = server(Behaviour::Fail(|| LLMError::Quota {
        status: 429,
        message: "insufficient_quota".into(),
    }));
    let resp = quota
        .post("/analyze-code")
        .json(&analyze_body("x = 1", 5))
        .await;
    assert_eq!(resp.status_code(), 502);
    let body: Value = resp.json();
    assert_eq!(body["kind"], "upstream");
    assert!(body["error"].as_str().unwrap().contains("quota"));

    let garbage = server(Behaviour::Garbage);
    let resp = garbage
        .post("/analyze-code")
        .json(&analyze_body("x = 1", 5))
        .await;
    assert_eq!(resp.status_code(), 502);
    let body: Value = resp.json();
    assert_eq!(body["kind"], "upstream_format");
}

#[tokio::test]
async fn inference_timeout_is_a_gateway_timeout_and_degrades_health() {
    let server = server(Behaviour::Hang);

    let resp = server
        .post("/analyze-code")
        .json(&analyze_body("x = 1", 5))
        .await;
    assert_eq!(resp.status_code(), 504);

    let page: Value = server.get("/analysis-history").await.json();
    assert!(page["history"].as_array().unwrap().is_empty());

    let resp = server.get("/health").await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["inference"]["status"], "degraded");
    assert_eq!(body["components"]["history"]["status"], "healthy");
}

#[tokio::test]
async fn persistence_failure_is_flagged_but_the_result_is_returned() {
    let server = server_with(StubGenerator::new(Behaviour::Suggest(2)), Arc::new(BrokenStore));

    let resp = server
        .post("/analyze-code")
        .json(&analyze_body("x = 1", 5))
        .await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["history_persisted"], false);
    assert!(body["history_error"]
        .as_str()
        .unwrap()
        .contains("database is locked"));
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 2);

    let resp = server.get("/analysis-history").await;
    assert_eq!(resp.status_code(), 503);
    let body: Value = resp.json();
    assert_eq!(body["kind"], "persistence");
}

#[tokio::test]
async fn history_query_parameters_are_validated() {
    let server = server(Behaviour::Suggest(1));

    for query in ["limit=0", "limit=101", "limit=abc", "offset=-1"] {
        let resp = server.get(&format!("/analysis-history?{}", query)).await;
        assert_eq!(resp.status_code(), 400, "query {}", query);
        let body: Value = resp.json();
        assert_eq!(body["kind"], "validation");
    }

    let resp = server.get("/analysis-history?limit=100&offset=5").await;
    assert_eq!(resp.status_code(), 200);
}

#[tokio::test]
async fn history_pages_are_stable_across_new_analyses() {
    let server = server(Behaviour::Suggest(1));

    let mut ids = Vec::new();
    for i in 0..4 {
        let body: Value = server
            .post("/analyze-code")
            .json(&analyze_body(&format!("print({})", i), 3))
            .await
            .json();
        ids.push(body["analysis_id"].as_str().unwrap().to_string());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let first: Value = server.get("/analysis-history?limit=2&offset=0").await.json();
    let as_of = first["as_of"].as_i64().unwrap();

    server
        .post("/analyze-code")
        .json(&analyze_body("print('late')", 3))
        .await;

    let second: Value = server
        .get(&format!("/analysis-history?limit=2&offset=2&as_of={}", as_of))
        .await
        .json();

    let listed: Vec<String> = first["history"]
        .as_array()
        .unwrap()
        .iter()
        .chain(second["history"].as_array().unwrap())
        .map(|e| e["id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = ids.into_iter().rev().collect();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn unknown_or_malformed_ids() {
    let server = server(Behaviour::Suggest(1));

    let resp = server
        .get("/analysis-history/00000000-0000-0000-0000-000000000000")
        .await;
    assert_eq!(resp.status_code(), 404);
    let body: Value = resp.json();
    assert_eq!(body["kind"], "not_found");

    let resp = server.get("/analysis-history/not-a-uuid").await;
    assert_eq!(resp.status_code(), 400);
}

#[tokio::test]
async fn health_reports_ok_before_any_inference_call() {
    let server = server(Behaviour::Suggest(1));

    let resp = server.get("/health").await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["components"]["inference"]["details"]["state"], "unknown");
    assert_eq!(body["components"]["history"]["details"]["backend"], "memory");
}

#[tokio::test]
async fn health_is_an_error_without_credentials_or_history() {
    let no_credentials = server_with(
        StubGenerator::without_credentials(),
        Arc::new(InMemoryHistoryStore::new()),
    );
    let resp = no_credentials.get("/health").await;
    assert_eq!(resp.status_code(), 503);
    let body: Value = resp.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["components"]["inference"]["status"], "unhealthy");

    let broken_history = server_with(StubGenerator::new(Behaviour::Suggest(1)), Arc::new(BrokenStore));
    let resp = broken_history.get("/health").await;
    assert_eq!(resp.status_code(), 503);
    let body: Value = resp.json();
    assert_eq!(body["components"]["history"]["status"], "unhealthy");
}

#[tokio::test]
async fn agent_status_reports_totals() {
    let server = server(Behaviour::Suggest(1));
    for _ in 0..2 {
        server
            .post("/analyze-code")
            .json(&analyze_body("x = 1", 3))
            .await;
    }

    let resp = server.get("/agent-status").await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["total_analyses"], 2);
    assert_eq!(body["generator"], "stub/test");
    assert_eq!(body["history_backend"], "memory");
    assert_eq!(body["inference"]["state"], "available");
    assert!(body["last_analysis"].is_string());
}

#[tokio::test]
async fn metrics_are_exposed_in_text_format() {
    codereview_api::metrics::register_metrics();
    let server = server(Behaviour::Suggest(1));
    server
        .post("/analyze-code")
        .json(&analyze_body("x = 1", 3))
        .await;

    let resp = server.get("/metrics").await;
    assert_eq!(resp.status_code(), 200);
    let text = resp.text();
    assert!(text.contains("codereview_analyses_total"));
    assert!(text.contains("codereview_analysis_duration_seconds"));
}

#[tokio::test]
async fn state_from_settings_runs_offline_with_sqlite_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.inference.provider = "rules".into();
    settings.history.backend = HistoryBackend::Sqlite;
    settings.history.path = dir.path().join("history.db");

    let state = AppState::from_settings(&settings).await.unwrap();
    let server = TestServer::new(create_router(state)).unwrap();

    let code = "import os\n\ndef Compute(a):\n    return eval(a)\n";
    let resp = server
        .post("/analyze-code")
        .json(&analyze_body(code, 3))
        .await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["history_persisted"], true);
    assert!(body["suggestions"][0]
        .as_str()
        .unwrap()
        .contains("eval()"));

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["components"]["history"]["details"]["backend"], "sqlite");
}
