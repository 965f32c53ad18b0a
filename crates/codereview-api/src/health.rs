use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use codereview_core::AGENT_VERSION;
use codereview_pipeline::InferenceState;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tokio::time::{timeout, Duration};

const HISTORY_CHECK_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub components: ComponentsHealth,
}

#[derive(Serialize, Debug)]
pub struct ComponentsHealth {
    pub inference: ComponentStatus,
    pub history: ComponentStatus,
}

#[derive(Serialize, Debug)]
pub struct ComponentStatus {
    pub status: String,
    pub last_check: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
    pub details: Option<HashMap<String, String>>,
    pub error: Option<String>,
}

impl ComponentStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            last_check: Utc::now(),
            response_time_ms: None,
            details: None,
            error: None,
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            last_check: Utc::now(),
            response_time_ms: None,
            details: None,
            error: Some(error),
        }
    }

    pub fn degraded(error: String, details: HashMap<String, String>) -> Self {
        Self {
            status: "degraded".to_string(),
            last_check: Utc::now(),
            response_time_ms: None,
            details: Some(details),
            error: Some(error),
        }
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }

    fn is(&self, status: &str) -> bool {
        self.status == status
    }
}

impl ComponentsHealth {
    /// "error" if any component is unhealthy, "degraded" if any is degraded.
    pub fn overall(&self) -> &'static str {
        let all = [&self.inference, &self.history];
        if all.iter().any(|c| c.is("unhealthy")) {
            "error"
        } else if all.iter().any(|c| c.is("degraded")) {
            "degraded"
        } else {
            "ok"
        }
    }
}

/// Readiness for UI gating. 503 only when analyses cannot succeed at all.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let components = ComponentsHealth {
        inference: check_inference_health(&state),
        history: check_history_health(&state).await,
    };

    let status = components.overall();
    let code = if status == "error" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: AGENT_VERSION.to_string(),
            timestamp: Utc::now(),
            uptime_seconds: state.uptime_seconds(),
            components,
        }),
    )
}

/// Judged from configuration and the last observed call; never issues a
/// request of its own.
fn check_inference_health(state: &AppState) -> ComponentStatus {
    let generator = state.pipeline.generator();
    let snapshot = state.pipeline.inference_health().snapshot();

    let mut details = HashMap::new();
    details.insert("generator".to_string(), generator.name().to_string());
    details.insert(
        "consecutive_failures".to_string(),
        snapshot.consecutive_failures.to_string(),
    );
    if let Some(checked) = snapshot.last_checked {
        details.insert("last_checked".to_string(), checked.to_rfc3339());
    }

    if !generator.credentials_configured() {
        return ComponentStatus::unhealthy("Inference credentials are not configured".to_string())
            .with_details(details);
    }

    match snapshot.state {
        InferenceState::Unavailable => ComponentStatus::degraded(
            snapshot
                .last_error
                .unwrap_or_else(|| "Inference provider unavailable".to_string()),
            details,
        ),
        InferenceState::Available | InferenceState::Unknown => {
            let state = format!("{:?}", snapshot.state).to_lowercase();
            details.insert("state".to_string(), state);
            ComponentStatus::healthy().with_details(details)
        }
    }
}

async fn check_history_health(state: &AppState) -> ComponentStatus {
    let start = Instant::now();
    let history = state.pipeline.history();

    let health_check = timeout(HISTORY_CHECK_TIMEOUT, history.ping()).await;
    let response_time = start.elapsed().as_millis() as u64;

    let mut details = HashMap::new();
    details.insert("backend".to_string(), history.backend().to_string());

    match health_check {
        Ok(Ok(())) => ComponentStatus::healthy()
            .with_response_time(response_time)
            .with_details(details),
        Ok(Err(e)) => ComponentStatus::unhealthy(format!("History store error: {}", e))
            .with_response_time(response_time)
            .with_details(details),
        Err(_) => ComponentStatus::unhealthy("History store timeout".to_string())
            .with_response_time(response_time)
            .with_details(details),
    }
}
