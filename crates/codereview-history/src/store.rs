use async_trait::async_trait;
use codereview_core::{
    AnalysisId, AnalysisRecord, HistoryEntry, HistoryPage, HistoryQuery, HistoryStats,
    ReviewError, StoredAnalysis,
};
use thiserror::Error;

pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("invalid history query: {0}")]
    InvalidQuery(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<HistoryError> for ReviewError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::InvalidQuery(message) => ReviewError::Validation(message),
            other => ReviewError::Persistence(other.to_string()),
        }
    }
}

/// Append-only record of completed analyses.
///
/// Listings are ordered newest first (`created_at` desc, then `id` desc).
/// Every appended row receives a monotonically increasing sequence number;
/// a listing only sees rows with `seq <= as_of`, which keeps page boundaries
/// fixed while new analyses arrive.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist one record atomically and return its listing entry.
    async fn append(&self, record: &AnalysisRecord) -> HistoryResult<HistoryEntry>;

    async fn list(&self, query: HistoryQuery) -> HistoryResult<HistoryPage>;

    async fn get(&self, id: AnalysisId) -> HistoryResult<Option<StoredAnalysis>>;

    async fn stats(&self) -> HistoryResult<HistoryStats>;

    /// Cheap liveness check for health reporting.
    async fn ping(&self) -> HistoryResult<()>;

    fn backend(&self) -> &'static str;
}

pub(crate) fn check_query(query: &HistoryQuery) -> HistoryResult<()> {
    query.validate().map_err(|e| match e {
        ReviewError::Validation(message) => HistoryError::InvalidQuery(message),
        other => HistoryError::InvalidQuery(other.to_string()),
    })
}
