use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::Pattern;
use crate::types::Decision;

/// Outcome of one node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Error,
    Skipped,
    Timeout,
}

/// Audit record of one node's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub node_id: String,
    pub input: Value,
    /// `Null` unless the node succeeded.
    pub output: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of attempts made (1 unless retried).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Routing decision made at this step (supervisor and handoff patterns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

fn default_attempts() -> u32 {
    1
}

impl HistoryEntry {
    /// An entry for a node that was never run.
    pub fn skipped(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            node_id: node_id.into(),
            input: Value::Null,
            output: Value::Null,
            started_at: now,
            finished_at: now,
            status: NodeStatus::Skipped,
            error: Some(reason.into()),
            attempts: 0,
            decision: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == NodeStatus::Success
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Aggregate bookkeeping for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub start_time: DateTime<Utc>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub pattern: Pattern,
    #[serde(default)]
    pub retries: u32,
}

/// Workflow-wide time limit, shared by every node call of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    /// The configured limit, for error messages.
    pub timeout_ms: u64,
}

impl Deadline {
    pub fn after_ms(timeout_ms: u64) -> Self {
        Self {
            at: Instant::now() + Duration::from_millis(timeout_ms),
            timeout_ms,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Mutable state of a single workflow run.
///
/// Owned by exactly one execution. History is append-only: entries can be
/// added with [`record`](Self::record) but never changed or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: String,
    pub input: Value,
    #[serde(default)]
    pub current_node: Option<String>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    /// Scratch key/value state shared by the nodes of this run.
    #[serde(default)]
    pub state: HashMap<String, Value>,
    pub metadata: ExecutionMetadata,
    /// Not persisted: an `Instant` means nothing outside this process.
    #[serde(skip)]
    pub deadline: Option<Deadline>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: impl Into<String>,
        input: Value,
        pattern: Pattern,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            input,
            current_node: None,
            history: Vec::new(),
            state: HashMap::new(),
            metadata: ExecutionMetadata {
                start_time: Utc::now(),
                total_tokens: 0,
                total_cost: 0.0,
                pattern,
                retries: 0,
            },
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Append an entry to the audit trail.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Fold resource usage reported by the node executor.
    pub fn add_usage(&mut self, tokens: u64, cost: f64) {
        self.metadata.total_tokens += tokens;
        self.metadata.total_cost += cost;
    }

    pub fn add_retries(&mut self, retries: u32) {
        self.metadata.retries += retries;
    }

    /// Whether `node_id` was actually invoked: it has an entry other than
    /// `Skipped`. Failed and timed-out invocations count.
    pub fn has_visited(&self, node_id: &str) -> bool {
        self.history
            .iter()
            .any(|e| e.node_id == node_id && e.status != NodeStatus::Skipped)
    }

    /// Number of node invocations (skipped nodes excluded).
    pub fn nodes_executed(&self) -> usize {
        self.history
            .iter()
            .filter(|e| e.status != NodeStatus::Skipped)
            .count()
    }

    /// Output of the most recent successful node, or `Null`.
    pub fn last_output(&self) -> Value {
        self.history
            .iter()
            .rev()
            .find(|e| e.succeeded())
            .map(|e| e.output.clone())
            .unwrap_or(Value::Null)
    }

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }
}
