use crate::error::{ReviewError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const MIN_SUGGESTIONS: u32 = 1;
pub const MAX_SUGGESTIONS: u32 = 50;
pub const DEFAULT_MAX_SUGGESTIONS: u32 = 20;

pub const DEFAULT_HISTORY_LIMIT: u32 = 10;
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// Characters of the submitted snippet kept in history listings.
pub const SNIPPET_PREVIEW_CHARS: usize = 200;

/// Version recorded with every persisted analysis.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub type AnalysisId = Uuid;

fn default_true() -> bool {
    true
}

fn default_max_suggestions() -> u32 {
    DEFAULT_MAX_SUGGESTIONS
}

/// Ingress bounds that come from configuration rather than the request itself.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisLimits {
    pub max_code_length: usize,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            max_code_length: 10_000,
        }
    }
}

/// A snippet plus the toggles that shape its review.
///
/// Fields are private so a request cannot be altered after it has been
/// deserialized or built; use [`AnalysisRequest::validate`] to obtain the
/// settings that flow through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    code_snippet: String,
    #[serde(default = "default_true")]
    include_performance_analysis: bool,
    #[serde(default = "default_true")]
    include_security_analysis: bool,
    #[serde(default = "default_max_suggestions")]
    max_suggestions: u32,
}

impl AnalysisRequest {
    pub fn new(
        code_snippet: impl Into<String>,
        include_performance_analysis: bool,
        include_security_analysis: bool,
        max_suggestions: u32,
    ) -> Self {
        Self {
            code_snippet: code_snippet.into(),
            include_performance_analysis,
            include_security_analysis,
            max_suggestions,
        }
    }

    pub fn code_snippet(&self) -> &str {
        &self.code_snippet
    }

    pub fn include_performance_analysis(&self) -> bool {
        self.include_performance_analysis
    }

    pub fn include_security_analysis(&self) -> bool {
        self.include_security_analysis
    }

    pub fn max_suggestions(&self) -> u32 {
        self.max_suggestions
    }

    /// Check the request and derive the immutable settings for one run.
    pub fn validate(&self, limits: &AnalysisLimits) -> Result<AnalysisSettings> {
        if self.code_snippet.trim().is_empty() {
            return Err(ReviewError::Validation(
                "code_snippet cannot be empty".to_string(),
            ));
        }

        let length = self.code_snippet.chars().count();
        if length > limits.max_code_length {
            return Err(ReviewError::Validation(format!(
                "code_snippet is {} characters, the maximum is {}",
                length, limits.max_code_length
            )));
        }

        if !(MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(&self.max_suggestions) {
            return Err(ReviewError::Validation(format!(
                "max_suggestions must be between {} and {}, got {}",
                MIN_SUGGESTIONS, MAX_SUGGESTIONS, self.max_suggestions
            )));
        }

        Ok(AnalysisSettings {
            performance: self.include_performance_analysis,
            security: self.include_security_analysis,
            max_suggestions: self.max_suggestions as usize,
        })
    }
}

/// Per-request analysis toggles, passed explicitly to every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub performance: bool,
    pub security: bool,
    pub max_suggestions: usize,
}

/// Static metrics derived from a snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub lines_of_code: u32,
    pub cyclomatic_complexity: u32,
    /// 0-100, higher is easier to maintain.
    pub maintainability_index: f64,
    /// Speculative 0-100 estimate inferred from test-like code in the
    /// snippet. No tests are executed; this is not measured coverage.
    pub code_coverage_estimate: f64,
}

/// One unit of natural-language advice. Position in a list is its priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Suggestion(String);

impl Suggestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Suggestion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Suggestion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The outcome of one pipeline run and the unit persisted to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: AnalysisId,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics: Option<Metrics>,
    pub suggestions: Vec<Suggestion>,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// What the history store writes: the result plus the snippet it came from.
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub result: AnalysisResult,
    pub code_snippet: String,
    pub agent_version: String,
}

impl AnalysisRecord {
    pub fn new(result: AnalysisResult, code_snippet: impl Into<String>) -> Self {
        Self {
            result,
            code_snippet: code_snippet.into(),
            agent_version: AGENT_VERSION.to_string(),
        }
    }

    pub fn entry(&self) -> HistoryEntry {
        HistoryEntry {
            id: self.result.analysis_id,
            code_snippet: snippet_preview(&self.code_snippet),
            suggestions_count: self.result.suggestions.len(),
            summary: self.result.summary.clone(),
            created_at: self.result.created_at,
            processing_time_ms: self.result.processing_time_ms,
            agent_version: self.agent_version.clone(),
        }
    }
}

/// Listing projection of a stored analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: AnalysisId,
    /// First characters of the snippet, suffixed with "..." when cut.
    pub code_snippet: String,
    pub suggestions_count: usize,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub agent_version: String,
}

/// A complete stored analysis, as returned by lookup by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub id: AnalysisId,
    pub code_snippet: String,
    pub suggestions: Vec<Suggestion>,
    pub summary: String,
    pub metrics: Option<Metrics>,
    pub created_at: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub agent_version: String,
}

impl From<&AnalysisRecord> for StoredAnalysis {
    fn from(record: &AnalysisRecord) -> Self {
        Self {
            id: record.result.analysis_id,
            code_snippet: record.code_snippet.clone(),
            suggestions: record.result.suggestions.clone(),
            summary: record.result.summary.clone(),
            metrics: record.result.metrics.clone(),
            created_at: record.result.created_at,
            processing_time_ms: record.result.processing_time_ms,
            agent_version: record.agent_version.clone(),
        }
    }
}

/// Pagination request for the history listing.
///
/// `as_of` pins the listing to entries that existed when the first page was
/// served, so later appends cannot shift or duplicate rows across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: u32,
    pub offset: u32,
    pub as_of: Option<i64>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
            as_of: None,
        }
    }
}

impl HistoryQuery {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit,
            offset,
            as_of: None,
        }
    }

    pub fn as_of(mut self, snapshot: i64) -> Self {
        self.as_of = Some(snapshot);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_HISTORY_LIMIT {
            return Err(ReviewError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_HISTORY_LIMIT, self.limit
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub history: Vec<HistoryEntry>,
    /// Snapshot marker to pass back when fetching the following pages.
    pub as_of: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_analyses: u64,
    pub average_processing_time_ms: f64,
    pub last_analysis: Option<DateTime<Utc>>,
}

pub fn snippet_preview(code: &str) -> String {
    match code.char_indices().nth(SNIPPET_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &code[..cut]),
        None => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> AnalysisLimits {
        AnalysisLimits::default()
    }

    #[test]
    fn request_defaults_when_toggles_are_omitted() {
        let request: AnalysisRequest =
            serde_json::from_str(r#"{"code_snippet": "x = 1"}"#).unwrap();
        assert!(request.include_performance_analysis());
        assert!(request.include_security_analysis());
        assert_eq!(request.max_suggestions(), DEFAULT_MAX_SUGGESTIONS);
    }

    #[test]
    fn empty_and_blank_snippets_are_rejected() {
        for code in ["", "   \n\t"] {
            let request = AnalysisRequest::new(code, true, true, 5);
            assert!(matches!(
                request.validate(&limits()),
                Err(ReviewError::Validation(_))
            ));
        }
    }

    #[test]
    fn max_suggestions_bounds_are_inclusive() {
        for (max, ok) in [(0, false), (1, true), (50, true), (51, false)] {
            let request = AnalysisRequest::new("print(1)", true, true, max);
            assert_eq!(request.validate(&limits()).is_ok(), ok, "max = {}", max);
        }
    }

    #[test]
    fn oversized_snippets_are_rejected() {
        let request = AnalysisRequest::new("x".repeat(11), true, false, 3);
        let small = AnalysisLimits { max_code_length: 10 };
        assert!(request.validate(&small).is_err());
    }

    #[test]
    fn settings_carry_the_request_toggles() {
        let request = AnalysisRequest::new("print(1)", false, true, 7);
        let settings = request.validate(&limits()).unwrap();
        assert_eq!(
            settings,
            AnalysisSettings {
                performance: false,
                security: true,
                max_suggestions: 7,
            }
        );
    }

    #[test]
    fn suggestions_serialize_as_plain_strings() {
        let json = serde_json::to_string(&vec![Suggestion::new("Use a set")]).unwrap();
        assert_eq!(json, r#"["Use a set"]"#);
    }

    #[test]
    fn preview_cuts_long_snippets_on_char_boundaries() {
        let long = "é".repeat(SNIPPET_PREVIEW_CHARS + 5);
        let preview = snippet_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), SNIPPET_PREVIEW_CHARS + 3);
        assert_eq!(snippet_preview("short"), "short");
    }

    #[test]
    fn history_limit_is_bounded() {
        assert!(HistoryQuery::new(0, 0).validate().is_err());
        assert!(HistoryQuery::new(101, 0).validate().is_err());
        assert!(HistoryQuery::new(100, 0).validate().is_ok());
    }
}
