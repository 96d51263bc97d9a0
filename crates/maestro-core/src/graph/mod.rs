//! Workflow graph model.
//!
//! A workflow is a set of `AgentNode`s connected by `AgentEdge`s, plus the
//! orchestration `Pattern` that decides how the graph is traversed. These are
//! plain value types: once a definition is registered it is never mutated.

pub mod edge;
pub mod node;
pub mod workflow;

pub use edge::{evaluate_condition, AgentEdge, EdgeCondition};
pub use node::AgentNode;
pub use workflow::{ErrorHandling, HumanInTheLoop, Pattern, WorkflowConfig, WorkflowDefinition};
