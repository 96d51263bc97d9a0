use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::{ExecutionContext, HistoryEntry};

/// Generate a fresh execution id.
pub fn new_execution_id() -> String {
    Uuid::new_v4().to_string()
}

/// What a decision policy wants to happen next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Node to run next; `None` ends the run.
    pub next_node: Option<String>,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default)]
    pub needs_human_approval: bool,
}

impl Decision {
    /// Route to `node_id`.
    pub fn goto(node_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            next_node: Some(node_id.into()),
            reasoning: reasoning.into(),
            confidence: 1.0,
            needs_human_approval: false,
        }
    }

    /// End the run here.
    pub fn stop(reasoning: impl Into<String>) -> Self {
        Self {
            next_node: None,
            reasoning: reasoning.into(),
            confidence: 1.0,
            needs_human_approval: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.needs_human_approval = true;
        self
    }
}

/// What a node executor reports for one successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutput {
    pub output: Value,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

impl NodeOutput {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            tokens_used: 0,
            cost_usd: 0.0,
        }
    }

    pub fn with_usage(mut self, tokens_used: u64, cost_usd: f64) -> Self {
        self.tokens_used = tokens_used;
        self.cost_usd = cost_usd;
        self
    }
}

/// Terminal status of an execution. Callers branch on this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    PendingApproval,
    Timeout,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::PendingApproval => write!(f, "pending_approval"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub duration_ms: u64,
    pub nodes_executed: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub retries: u32,
}

/// Terminal outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    /// Final output, or the partial output for failed/suspended runs.
    pub output: Value,
    pub metrics: ExecutionMetrics,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The decision awaiting approval when `status` is `pending_approval`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_decision: Option<Decision>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Everything kept about a finished execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub context: ExecutionContext,
    pub result: ExecutionResult,
}
