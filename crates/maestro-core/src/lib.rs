pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod graph;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use context::{Deadline, ExecutionContext, ExecutionMetadata, HistoryEntry, NodeStatus};
pub use error::{MaestroError, Result, ValidationError};
pub use event::{EventBus, WorkflowEvent};
pub use graph::{
    AgentEdge, AgentNode, EdgeCondition, ErrorHandling, HumanInTheLoop, Pattern, WorkflowConfig,
    WorkflowDefinition,
};
pub use traits::{DecisionPolicy, DecisionRequest, NodeExecutor, WorkflowStore};
pub use types::*;
