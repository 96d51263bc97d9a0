use serde::Serialize;
use serde_json::Value;

use crate::context::NodeStatus;
use crate::graph::Pattern;
use crate::types::{Decision, ExecutionStatus};

/// Progress notifications emitted while workflows run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An execution was created and its pattern is about to run.
    ExecutionStarted {
        execution_id: String,
        workflow_id: String,
        pattern: Pattern,
    },
    /// A node invocation is starting.
    NodeStarted { execution_id: String, node_id: String },
    /// A node invocation finished (any status).
    NodeFinished {
        execution_id: String,
        node_id: String,
        status: NodeStatus,
        elapsed_ms: u64,
    },
    /// A concurrent batch is about to fan out.
    BatchStarted {
        execution_id: String,
        batch: usize,
        size: usize,
    },
    /// The run suspended waiting for a human.
    ApprovalRequired {
        execution_id: String,
        decision: Decision,
    },
    /// The run reached a terminal status.
    ExecutionFinished {
        execution_id: String,
        status: ExecutionStatus,
        output: Value,
    },
}

impl WorkflowEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeFinished { execution_id, .. }
            | Self::BatchStarted { execution_id, .. }
            | Self::ApprovalRequired { execution_id, .. }
            | Self::ExecutionFinished { execution_id, .. } => execution_id,
        }
    }

    /// Short event name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutionStarted { .. } => "execution_started",
            Self::NodeStarted { .. } => "node_started",
            Self::NodeFinished { .. } => "node_finished",
            Self::BatchStarted { .. } => "batch_started",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::ExecutionFinished { .. } => "execution_finished",
        }
    }
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
