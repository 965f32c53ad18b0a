use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use codereview_core::{
    snippet_preview, AnalysisId, AnalysisRecord, HistoryEntry, HistoryPage, HistoryQuery,
    HistoryStats, Metrics, StoredAnalysis, Suggestion,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::pool::ConnectionPool;
use crate::store::{check_query, HistoryError, HistoryResult, HistoryStore};

const DB_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed history with a bounded connection pool.
pub struct SqliteHistoryStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteHistoryStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: impl Into<PathBuf>, pool_size: usize) -> HistoryResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HistoryError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let pool = Arc::new(ConnectionPool::new(path, pool_size));
        pool.with_connection(|conn| initialize_schema(conn)).await?;

        info!(
            path = %pool.path().display(),
            pool_size = pool.size(),
            "History store ready"
        );
        Ok(Self { pool })
    }
}

pub fn initialize_schema(conn: &Connection) -> HistoryResult<()> {
    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        debug!(version, "History schema is newer than this build");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> HistoryResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS analysis_history (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            code_snippet TEXT NOT NULL,
            suggestions TEXT NOT NULL DEFAULT '[]',
            summary TEXT NOT NULL,
            metrics TEXT,
            created_at TEXT NOT NULL,
            agent_version TEXT NOT NULL,
            processing_time INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_analysis_history_recency
            ON analysis_history(created_at DESC, id DESC);
        ",
    )?;
    Ok(())
}

/// Fixed-width UTC timestamps sort lexicographically in time order.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> HistoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| HistoryError::Corrupt(format!("created_at '{}': {}", raw, e)))
}

fn decode_id(raw: &str) -> HistoryResult<AnalysisId> {
    Uuid::parse_str(raw).map_err(|e| HistoryError::Corrupt(format!("id '{}': {}", raw, e)))
}

fn decode_suggestions(raw: &str) -> HistoryResult<Vec<Suggestion>> {
    serde_json::from_str(raw).map_err(|e| HistoryError::Corrupt(format!("suggestions: {}", e)))
}

/// Raw column values, decoded outside the rusqlite row callback.
struct HistoryRow {
    id: String,
    code_snippet: String,
    suggestions: String,
    summary: String,
    metrics: Option<String>,
    created_at: String,
    agent_version: String,
    processing_time: i64,
}

const HISTORY_COLUMNS: &str =
    "id, code_snippet, suggestions, summary, metrics, created_at, agent_version, processing_time";

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code_snippet: row.get(1)?,
            suggestions: row.get(2)?,
            summary: row.get(3)?,
            metrics: row.get(4)?,
            created_at: row.get(5)?,
            agent_version: row.get(6)?,
            processing_time: row.get(7)?,
        })
    }

    fn into_entry(self) -> HistoryResult<HistoryEntry> {
        Ok(HistoryEntry {
            id: decode_id(&self.id)?,
            code_snippet: snippet_preview(&self.code_snippet),
            suggestions_count: decode_suggestions(&self.suggestions)?.len(),
            summary: self.summary,
            created_at: decode_timestamp(&self.created_at)?,
            processing_time_ms: self.processing_time.max(0) as u64,
            agent_version: self.agent_version,
        })
    }

    fn into_stored(self) -> HistoryResult<StoredAnalysis> {
        let metrics = self
            .metrics
            .as_deref()
            .map(serde_json::from_str::<Metrics>)
            .transpose()
            .map_err(|e| HistoryError::Corrupt(format!("metrics: {}", e)))?;

        Ok(StoredAnalysis {
            id: decode_id(&self.id)?,
            code_snippet: self.code_snippet,
            suggestions: decode_suggestions(&self.suggestions)?,
            summary: self.summary,
            metrics,
            created_at: decode_timestamp(&self.created_at)?,
            processing_time_ms: self.processing_time.max(0) as u64,
            agent_version: self.agent_version,
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, record: &AnalysisRecord) -> HistoryResult<HistoryEntry> {
        let entry = record.entry();
        let suggestions = serde_json::to_string(&record.result.suggestions)
            .map_err(|e| HistoryError::Corrupt(format!("suggestions: {}", e)))?;
        let metrics = record
            .result
            .metrics
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| HistoryError::Corrupt(format!("metrics: {}", e)))?;
        let id = record.result.analysis_id.to_string();
        let code_snippet = record.code_snippet.clone();
        let summary = record.result.summary.clone();
        let created_at = encode_timestamp(&record.result.created_at);
        let agent_version = record.agent_version.clone();
        let processing_time = i64::try_from(record.result.processing_time_ms).unwrap_or(i64::MAX);

        let seq = self
            .pool
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO analysis_history
                        (id, code_snippet, suggestions, summary, metrics, created_at, agent_version, processing_time)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        code_snippet,
                        suggestions,
                        summary,
                        metrics,
                        created_at,
                        agent_version,
                        processing_time
                    ],
                )?;
                let seq = tx.last_insert_rowid();
                tx.commit()?;
                Ok(seq)
            })
            .await?;

        debug!(analysis_id = %entry.id, seq, "Appended analysis to history");
        Ok(entry)
    }

    async fn list(&self, query: HistoryQuery) -> HistoryResult<HistoryPage> {
        check_query(&query)?;

        self.pool
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let as_of = match query.as_of {
                    Some(snapshot) => snapshot,
                    None => tx.query_row(
                        "SELECT COALESCE(MAX(seq), 0) FROM analysis_history",
                        [],
                        |row| row.get(0),
                    )?,
                };

                let rows = {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT {HISTORY_COLUMNS} FROM analysis_history
                         WHERE seq <= ?1
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?2 OFFSET ?3"
                    ))?;
                    let rows = stmt
                        .query_map(
                            params![as_of, query.limit, query.offset],
                            HistoryRow::from_row,
                        )?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                };
                tx.commit()?;

                let history = rows
                    .into_iter()
                    .map(HistoryRow::into_entry)
                    .collect::<HistoryResult<Vec<_>>>()?;
                Ok(HistoryPage { history, as_of })
            })
            .await
    }

    async fn get(&self, id: AnalysisId) -> HistoryResult<Option<StoredAnalysis>> {
        let id = id.to_string();
        self.pool
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {HISTORY_COLUMNS} FROM analysis_history WHERE id = ?1"),
                        params![id],
                        HistoryRow::from_row,
                    )
                    .optional()?;
                row.map(HistoryRow::into_stored).transpose()
            })
            .await
    }

    async fn stats(&self) -> HistoryResult<HistoryStats> {
        self.pool
            .with_connection(|conn| {
                let (total, average, last): (i64, Option<f64>, Option<String>) = conn.query_row(
                    "SELECT COUNT(*), AVG(processing_time), MAX(created_at) FROM analysis_history",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;

                Ok(HistoryStats {
                    total_analyses: total.max(0) as u64,
                    average_processing_time_ms: average.unwrap_or(0.0),
                    last_analysis: last.as_deref().map(decode_timestamp).transpose()?,
                })
            })
            .await
    }

    async fn ping(&self) -> HistoryResult<()> {
        self.pool
            .with_connection(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
