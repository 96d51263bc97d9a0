use std::sync::Arc;

use tracing::{info, warn};

use maestro_core::error::Result;
use maestro_core::graph::WorkflowDefinition;
use maestro_core::traits::WorkflowStore;

use crate::store::InMemoryStore;
use crate::validate::validate_workflow;

/// Validated access to workflow definitions.
///
/// A definition is checked in full before it reaches the store, so a rejected
/// registration leaves the store untouched.
#[derive(Clone)]
pub struct WorkflowRegistry {
    store: Arc<dyn WorkflowStore>,
}

impl WorkflowRegistry {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn register(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition> {
        if let Err(e) = validate_workflow(&workflow) {
            warn!(workflow_id = %workflow.id, error = %e, "Rejected workflow");
            return Err(e.into());
        }
        self.store.insert_workflow(&workflow)?;
        info!(
            workflow_id = %workflow.id,
            pattern = %workflow.pattern,
            nodes = workflow.nodes.len(),
            "Registered workflow"
        );
        Ok(workflow)
    }

    pub fn get(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        self.store.get_workflow(id)
    }

    pub fn list(&self) -> Result<Vec<WorkflowDefinition>> {
        self.store.list_workflows()
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.store.delete_workflow(id)?;
        if existed {
            info!(workflow_id = %id, "Deleted workflow");
        }
        Ok(existed)
    }
}
