use async_trait::async_trait;
use codereview_core::{
    AnalysisId, AnalysisRecord, HistoryEntry, HistoryPage, HistoryQuery, HistoryStats,
    StoredAnalysis,
};
use parking_lot::RwLock;
use std::cmp::Reverse;

use crate::store::{check_query, HistoryError, HistoryResult, HistoryStore};

/// Process-local history for standalone runs and tests. Same ordering and
/// snapshot semantics as the SQLite store; contents are lost on restart.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: RwLock<Vec<(i64, AnalysisRecord)>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: &AnalysisRecord) -> HistoryResult<HistoryEntry> {
        let mut rows = self.rows.write();
        let id = record.result.analysis_id;
        if rows.iter().any(|(_, r)| r.result.analysis_id == id) {
            return Err(HistoryError::Unavailable(format!(
                "analysis {} already recorded",
                id
            )));
        }
        let seq = rows.last().map(|(seq, _)| seq + 1).unwrap_or(1);
        rows.push((seq, record.clone()));
        Ok(record.entry())
    }

    async fn list(&self, query: HistoryQuery) -> HistoryResult<HistoryPage> {
        check_query(&query)?;
        let rows = self.rows.read();
        let as_of = query
            .as_of
            .unwrap_or_else(|| rows.last().map(|(seq, _)| *seq).unwrap_or(0));

        let mut visible: Vec<&AnalysisRecord> = rows
            .iter()
            .filter(|(seq, _)| *seq <= as_of)
            .map(|(_, record)| record)
            .collect();
        visible.sort_by_key(|r| Reverse((r.result.created_at, r.result.analysis_id)));

        let history = visible
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(AnalysisRecord::entry)
            .collect();
        Ok(HistoryPage { history, as_of })
    }

    async fn get(&self, id: AnalysisId) -> HistoryResult<Option<StoredAnalysis>> {
        Ok(self
            .rows
            .read()
            .iter()
            .find(|(_, r)| r.result.analysis_id == id)
            .map(|(_, r)| StoredAnalysis::from(r)))
    }

    async fn stats(&self) -> HistoryResult<HistoryStats> {
        let rows = self.rows.read();
        let total = rows.len() as u64;
        let average = if rows.is_empty() {
            0.0
        } else {
            rows.iter()
                .map(|(_, r)| r.result.processing_time_ms as f64)
                .sum::<f64>()
                / rows.len() as f64
        };
        Ok(HistoryStats {
            total_analyses: total,
            average_processing_time_ms: average,
            last_analysis: rows.iter().map(|(_, r)| r.result.created_at).max(),
        })
    }

    async fn ping(&self) -> HistoryResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
