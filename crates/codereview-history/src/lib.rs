pub mod memory;
pub mod pool;
pub mod sqlite;
pub mod store;

pub use memory::InMemoryHistoryStore;
pub use pool::ConnectionPool;
pub use sqlite::SqliteHistoryStore;
pub use store::{HistoryError, HistoryResult, HistoryStore};

use codereview_core::{HistoryBackend, HistoryConfig};
use std::sync::Arc;

/// Open the history backend selected in configuration.
pub async fn open_store(config: &HistoryConfig) -> HistoryResult<Arc<dyn HistoryStore>> {
    match config.backend {
        HistoryBackend::Sqlite => Ok(Arc::new(
            SqliteHistoryStore::open(config.path.clone(), config.pool_size).await?,
        )),
        HistoryBackend::Memory => {
            tracing::warn!("Using in-memory history; analyses will not survive a restart");
            Ok(Arc::new(InMemoryHistoryStore::new()))
        }
    }
}
