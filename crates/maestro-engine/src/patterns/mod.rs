//! Pattern executors.
//!
//! One [`PatternExecutor`] per orchestration pattern, looked up through a
//! [`PatternTable`] keyed by [`Pattern`]. Adding a pattern means registering
//! another executor, nothing else changes.

mod adaptive;
mod concurrent;
mod custom;
mod handoff;
mod sequential;
mod supervisor;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use maestro_core::error::{MaestroError, Result, ValidationError};
use maestro_core::graph::{AgentNode, ErrorHandling, Pattern, WorkflowDefinition};
use maestro_core::types::Decision;
use maestro_core::ExecutionContext;

use crate::policy::Policies;
use crate::runner::{NodeRun, NodeRunner};

pub use adaptive::AdaptiveNetwork;
pub use concurrent::Concurrent;
pub use custom::CustomDag;
pub use handoff::Handoff;
pub use sequential::Sequential;
pub use supervisor::Supervisor;

/// How a pattern run ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternOutcome {
    Completed(Value),
    /// Suspended until a human approves `decision`.
    PendingApproval { output: Value, decision: Decision },
}

/// What a pattern executor needs besides the workflow and the context.
pub struct ExecutionEnv {
    pub runner: NodeRunner,
    pub policies: Policies,
}

impl ExecutionEnv {
    pub fn new(runner: NodeRunner, policies: Policies) -> Self {
        Self { runner, policies }
    }

    /// Fold a node run into the context.
    ///
    /// Returns the output on success, `None` for a failure the run tolerates,
    /// and the error itself when it ends the run.
    pub(crate) fn settle(
        &self,
        ctx: &mut ExecutionContext,
        run: NodeRun,
        error_handling: ErrorHandling,
    ) -> Result<Option<Value>> {
        match self.runner.record(ctx, run) {
            Ok(output) => Ok(Some(output)),
            Err(e) if aborts(&e, error_handling) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

/// Strategy for traversing a workflow graph.
///
/// Returns `Err` when the run is aborted (fail-fast, timeout, invalid
/// decision). The context keeps whatever history was recorded up to then.
pub trait PatternExecutor: Send + Sync + 'static {
    fn pattern(&self) -> Pattern;

    fn run<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        env: &'a ExecutionEnv,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<PatternOutcome>>;

    /// Output reported when `run` was aborted part way.
    fn partial_output(&self, _workflow: &WorkflowDefinition, ctx: &ExecutionContext) -> Value {
        ctx.last_output()
    }
}

/// Registration table mapping each pattern to its executor.
pub struct PatternTable {
    executors: HashMap<Pattern, Arc<dyn PatternExecutor>>,
}

impl PatternTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// A table with the six built-in executors.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(Arc::new(Sequential));
        table.register(Arc::new(Concurrent));
        table.register(Arc::new(Supervisor));
        table.register(Arc::new(AdaptiveNetwork));
        table.register(Arc::new(Handoff));
        table.register(Arc::new(CustomDag));
        table
    }

    /// Register an executor, replacing any previous one for the same pattern.
    pub fn register(&mut self, executor: Arc<dyn PatternExecutor>) -> Option<Arc<dyn PatternExecutor>> {
        self.executors.insert(executor.pattern(), executor)
    }

    pub fn get(&self, pattern: Pattern) -> Result<Arc<dyn PatternExecutor>> {
        self.executors
            .get(&pattern)
            .cloned()
            .ok_or_else(|| MaestroError::UnsupportedPattern(pattern.to_string()))
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        Pattern::ALL
            .into_iter()
            .filter(|p| self.executors.contains_key(p))
            .collect()
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Whether a node failure ends the run.
///
/// Deadlines always abort; other failures only under fail-fast.
pub(crate) fn aborts(err: &MaestroError, error_handling: ErrorHandling) -> bool {
    err.is_timeout() || error_handling == ErrorHandling::FailFast
}

pub(crate) fn entry_node(workflow: &WorkflowDefinition) -> Result<&AgentNode> {
    workflow
        .node(&workflow.entry_point)
        .ok_or_else(|| ValidationError::UnknownEntryPoint(workflow.entry_point.clone()).into())
}

/// Resolve a policy's choice against the nodes it was offered.
pub(crate) fn chosen<'w>(
    candidates: &[&'w AgentNode],
    node_id: &str,
    policy: &str,
) -> Result<&'w AgentNode> {
    candidates
        .iter()
        .copied()
        .find(|n| n.id == node_id)
        .ok_or_else(|| MaestroError::InvalidDecision {
            policy: policy.to_string(),
            node_id: node_id.to_string(),
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use maestro_core::config::RetryConfig;
    use maestro_core::event::EventBus;
    use maestro_core::graph::WorkflowDefinition;
    use maestro_core::ExecutionContext;
    use maestro_test_utils::MockExecutor;
    use serde_json::Value;

    use super::ExecutionEnv;
    use crate::policy::Policies;
    use crate::runner::{NodeRunner, RunnerSettings};

    pub fn env_with(mock: Arc<MockExecutor>, policies: Policies) -> ExecutionEnv {
        let settings = RunnerSettings {
            default_node_timeout_ms: 2_000,
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
        };
        ExecutionEnv::new(
            NodeRunner::new(mock, settings, Arc::new(EventBus::default())),
            policies,
        )
    }

    pub fn env(mock: Arc<MockExecutor>) -> ExecutionEnv {
        env_with(mock, Policies::default())
    }

    pub fn context(workflow: &WorkflowDefinition, input: Value) -> ExecutionContext {
        ExecutionContext::new(&workflow.id, "ex-test", input, workflow.pattern)
    }

    pub fn visited(ctx: &ExecutionContext) -> Vec<String> {
        ctx.history().iter().map(|e| e.node_id.clone()).collect()
    }
}
