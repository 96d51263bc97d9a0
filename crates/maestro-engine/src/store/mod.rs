//! Workflow store backends.

mod memory;
mod sqlite;

use std::sync::Arc;

use maestro_core::config::{StoreBackend, StoreConfig};
use maestro_core::error::Result;
use maestro_core::traits::WorkflowStore;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Open the backend selected by `[store]`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn WorkflowStore>> {
    Ok(match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.resolved_path())?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_test_utils::fixtures;

    #[test]
    fn test_open_memory_by_default() {
        let store = open_store(&StoreConfig::default()).unwrap();
        assert!(store.list_workflows().unwrap().is_empty());
    }

    #[test]
    fn test_open_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            path: dir.path().join("nested").join("maestro.db").display().to_string(),
        };
        let store = open_store(&config).unwrap();
        store.insert_workflow(&fixtures::diamond_dag()).unwrap();
        assert_eq!(store.list_workflows().unwrap().len(), 1);
    }
}
