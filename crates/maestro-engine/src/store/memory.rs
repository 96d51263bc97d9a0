use std::collections::HashMap;
use std::sync::RwLock;

use maestro_core::error::{MaestroError, Result, ValidationError};
use maestro_core::graph::WorkflowDefinition;
use maestro_core::traits::WorkflowStore;
use maestro_core::types::ExecutionRecord;

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStore {
    /// Kept in registration order.
    workflows: RwLock<Vec<WorkflowDefinition>>,
    executions: RwLock<HashMap<String, ExecutionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> MaestroError {
    MaestroError::Store(e.to_string())
}

impl WorkflowStore for InMemoryStore {
    fn insert_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let mut workflows = self.workflows.write().map_err(poisoned)?;
        if workflows.iter().any(|w| w.id == workflow.id) {
            return Err(ValidationError::AlreadyRegistered(workflow.id.clone()).into());
        }
        workflows.push(workflow.clone());
        Ok(())
    }

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let workflows = self.workflows.read().map_err(poisoned)?;
        Ok(workflows.iter().find(|w| w.id == id).cloned())
    }

    fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        Ok(self.workflows.read().map_err(poisoned)?.clone())
    }

    fn delete_workflow(&self, id: &str) -> Result<bool> {
        let mut workflows = self.workflows.write().map_err(poisoned)?;
        let before = workflows.len();
        workflows.retain(|w| w.id != id);
        Ok(workflows.len() != before)
    }

    fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        self.executions
            .write()
            .map_err(poisoned)?
            .insert(record.result.execution_id.clone(), record.clone());
        Ok(())
    }

    fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self
            .executions
            .read()
            .map_err(poisoned)?
            .get(execution_id)
            .cloned())
    }
}
