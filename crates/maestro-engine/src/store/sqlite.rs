use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use maestro_core::error::{MaestroError, Result, ValidationError};
use maestro_core::graph::WorkflowDefinition;
use maestro_core::traits::WorkflowStore;
use maestro_core::types::ExecutionRecord;

/// Persistent store backed by SQLite.
///
/// Definitions and execution records are stored as JSON documents next to a
/// few indexed columns.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> MaestroError + '_ {
    move |e| MaestroError::Store(format!("{}: {}", context, e))
}

impl SqliteStore {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(db_err("Failed to open workflow store"))?;
        Self::init(conn)
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("Failed to open workflow store"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS workflows (
                 seq INTEGER PRIMARY KEY AUTOINCREMENT,
                 id TEXT NOT NULL UNIQUE,
                 pattern TEXT NOT NULL,
                 definition_json TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS executions (
                 execution_id TEXT PRIMARY KEY,
                 workflow_id TEXT NOT NULL,
                 status TEXT NOT NULL,
                 record_json TEXT NOT NULL,
                 finished_at TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_exec_workflow
                 ON executions(workflow_id, finished_at DESC);",
        )
        .map_err(db_err("Failed to initialize store schema"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MaestroError::Store(e.to_string()))
    }
}

impl WorkflowStore for SqliteStore {
    fn insert_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM workflows WHERE id = ?1",
                params![workflow.id],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err("Failed to look up workflow"))?
            .is_some();
        if exists {
            return Err(ValidationError::AlreadyRegistered(workflow.id.clone()).into());
        }

        conn.execute(
            "INSERT INTO workflows (id, pattern, definition_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                workflow.id,
                workflow.pattern.as_str(),
                serde_json::to_string(workflow)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err("Failed to save workflow"))?;
        Ok(())
    }

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT definition_json FROM workflows WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Failed to load workflow"))?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT definition_json FROM workflows ORDER BY seq")
            .map_err(db_err("Failed to prepare query"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err("Failed to list workflows"))?;

        let mut workflows = Vec::new();
        for row in rows {
            let json = row.map_err(db_err("Failed to read workflow row"))?;
            workflows.push(serde_json::from_str(&json)?);
        }
        Ok(workflows)
    }

    fn delete_workflow(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM workflows WHERE id = ?1", params![id])
            .map_err(db_err("Failed to delete workflow"))?;
        Ok(deleted > 0)
    }

    fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO executions (execution_id, workflow_id, status, record_json, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.result.execution_id,
                record.result.workflow_id,
                record.result.status.to_string(),
                serde_json::to_string(record)?,
                record.result.finished_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("Failed to save execution"))?;
        Ok(())
    }

    fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM executions WHERE execution_id = ?1",
                params![execution_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Failed to load execution"))?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
