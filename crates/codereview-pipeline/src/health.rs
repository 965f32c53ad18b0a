use chrono::{DateTime, Utc};
use codereview_ai::SuggestionGenerator;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceState {
    /// No call has completed since startup.
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceStatus {
    pub state: InferenceState,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// Last-known reachability of the inference provider, fed by every
/// pipeline call and by the optional background probe.
#[derive(Debug)]
pub struct InferenceHealth {
    status: RwLock<InferenceStatus>,
}

impl Default for InferenceHealth {
    fn default() -> Self {
        Self {
            status: RwLock::new(InferenceStatus {
                state: InferenceState::Unknown,
                last_checked: None,
                last_error: None,
                consecutive_failures: 0,
            }),
        }
    }
}

impl InferenceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        let mut status = self.status.write();
        status.state = InferenceState::Available;
        status.last_checked = Some(Utc::now());
        status.last_error = None;
        status.consecutive_failures = 0;
    }

    pub fn record_failure(&self, reason: impl Into<String>) {
        let mut status = self.status.write();
        status.state = InferenceState::Unavailable;
        status.last_checked = Some(Utc::now());
        status.last_error = Some(reason.into());
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
    }

    pub fn snapshot(&self) -> InferenceStatus {
        self.status.read().clone()
    }
}

/// Periodically probe the generator and record the outcome. Each probe may
/// cost a real inference request, so keep the interval generous.
pub fn spawn_inference_probe(
    generator: Arc<dyn SuggestionGenerator>,
    health: Arc<InferenceHealth>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if generator.probe().await {
                debug!(generator = generator.name(), "Inference probe succeeded");
                health.record_success();
            } else {
                warn!(generator = generator.name(), "Inference probe failed");
                health.record_failure("availability probe failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown() {
        let health = InferenceHealth::new();
        let status = health.snapshot();
        assert_eq!(status.state, InferenceState::Unknown);
        assert!(status.last_checked.is_none());
    }

    #[test]
    fn failures_accumulate_until_success() {
        let health = InferenceHealth::new();
        health.record_failure("timeout");
        health.record_failure("timeout");
        let status = health.snapshot();
        assert_eq!(status.state, InferenceState::Unavailable);
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.last_error.as_deref(), Some("timeout"));

        health.record_success();
        let status = health.snapshot();
        assert_eq!(status.state, InferenceState::Available);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
    }
}
