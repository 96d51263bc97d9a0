use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::graph::{AgentNode, WorkflowDefinition};
use crate::types::{Decision, ExecutionRecord, NodeOutput};

/// Node executor. Performs the actual work behind a graph node.
///
/// Implementations call out to an agent, model, or tool and report the
/// output together with the resources consumed. The context is read-only:
/// the engine folds usage and history itself.
pub trait NodeExecutor: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        node: &'a AgentNode,
        input: Value,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutput>>;
}

/// Everything a decision policy may look at.
#[derive(Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub workflow: &'a WorkflowDefinition,
    /// The node deciding (supervisor) or the node that just ran.
    pub current: &'a AgentNode,
    /// Nodes the policy may choose from, in declaration order.
    pub candidates: &'a [&'a AgentNode],
    /// Most recent output.
    pub output: &'a Value,
    /// Whether `current` produced `output` without failing.
    pub succeeded: bool,
    pub context: &'a ExecutionContext,
}

impl DecisionRequest<'_> {
    pub fn is_candidate(&self, node_id: &str) -> bool {
        self.candidates.iter().any(|n| n.id == node_id)
    }
}

/// Decision policy. Chooses the next node in non-linear patterns.
pub trait DecisionPolicy: Send + Sync + 'static {
    /// Policy name (used in logs and errors).
    fn name(&self) -> &str;

    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Decision>>;
}

/// Workflow store. Persistence backend for definitions and execution records.
pub trait WorkflowStore: Send + Sync + 'static {
    /// Insert a new definition. Fails with `AlreadyRegistered` if the id exists.
    fn insert_workflow(&self, workflow: &WorkflowDefinition) -> Result<()>;

    fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>>;

    /// All definitions in registration order.
    fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>>;

    /// Returns whether a definition existed.
    fn delete_workflow(&self, id: &str) -> Result<bool>;

    fn save_execution(&self, record: &ExecutionRecord) -> Result<()>;

    fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>>;
}
