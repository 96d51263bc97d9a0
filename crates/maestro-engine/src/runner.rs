use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use maestro_core::config::{AppConfig, RetryConfig};
use maestro_core::error::{MaestroError, Result};
use maestro_core::event::{EventBus, WorkflowEvent};
use maestro_core::graph::{AgentNode, ErrorHandling};
use maestro_core::traits::NodeExecutor;
use maestro_core::types::{Decision, NodeOutput};
use maestro_core::{ExecutionContext, HistoryEntry, NodeStatus};

/// Knobs for the node execution adapter.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub default_node_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl RunnerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_node_timeout_ms: config.engine.default_node_timeout_ms,
            retry: config.retry.clone(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One finished node invocation that has not been folded into the context yet.
#[derive(Debug)]
pub struct NodeRun {
    pub entry: HistoryEntry,
    tokens: u64,
    cost: f64,
    retries: u32,
    error: Option<MaestroError>,
}

impl NodeRun {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&MaestroError> {
        self.error.as_ref()
    }

    /// The produced value, if the node succeeded.
    pub fn output(&self) -> Option<&Value> {
        self.succeeded().then_some(&self.entry.output)
    }

    /// Attach the routing decision made at this step.
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.entry.decision = Some(decision);
        self
    }
}

/// Node execution adapter.
///
/// Wraps every call to the external `NodeExecutor` with a deadline, retry
/// handling, panic isolation and usage capture. Pattern executors either call
/// [`execute`](Self::execute), or split it into [`invoke`](Self::invoke) and
/// [`record`](Self::record) when several nodes run against the same context.
pub struct NodeRunner {
    executor: Arc<dyn NodeExecutor>,
    settings: RunnerSettings,
    events: Arc<EventBus>,
}

impl NodeRunner {
    pub fn new(
        executor: Arc<dyn NodeExecutor>,
        settings: RunnerSettings,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            executor,
            settings,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Invoke a node and record the outcome in the context's history.
    pub async fn execute(
        &self,
        node: &AgentNode,
        input: Value,
        ctx: &mut ExecutionContext,
        error_handling: ErrorHandling,
    ) -> Result<Value> {
        let run = self.invoke(node, input, ctx, error_handling).await;
        self.record(ctx, run)
    }

    /// Invoke a node without touching the context.
    ///
    /// Never fails: errors are carried inside the returned `NodeRun`.
    pub async fn invoke(
        &self,
        node: &AgentNode,
        input: Value,
        ctx: &ExecutionContext,
        error_handling: ErrorHandling,
    ) -> NodeRun {
        self.events.publish(WorkflowEvent::NodeStarted {
            execution_id: ctx.execution_id.clone(),
            node_id: node.id.clone(),
        });

        let max_attempts = match error_handling {
            ErrorHandling::Retry if node.max_retries > 0 => node.max_retries + 1,
            ErrorHandling::Retry => self.settings.retry.max_retries + 1,
            _ => 1,
        };

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut attempts = 0u32;

        let outcome = loop {
            attempts += 1;
            match self.attempt(node, input.clone(), ctx).await {
                Ok(output) => break Ok(output),
                Err(e) if e.is_timeout() || attempts >= max_attempts => break Err(e),
                Err(e) => {
                    let backoff = calculate_backoff(attempts - 1, &self.settings.retry);
                    warn!(
                        node_id = %node.id,
                        attempt = attempts,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying node"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        let finished_at = Utc::now();

        let (output, status, tokens, cost, error) = match outcome {
            Ok(out) => (out.output, NodeStatus::Success, out.tokens_used, out.cost_usd, None),
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Node failed");
                let status = if e.is_timeout() {
                    NodeStatus::Timeout
                } else {
                    NodeStatus::Error
                };
                (Value::Null, status, 0, 0.0, Some(e))
            }
        };

        debug!(node_id = %node.id, ?status, elapsed_ms, attempts, "Node execution complete");
        self.events.publish(WorkflowEvent::NodeFinished {
            execution_id: ctx.execution_id.clone(),
            node_id: node.id.clone(),
            status,
            elapsed_ms,
        });

        NodeRun {
            entry: HistoryEntry {
                node_id: node.id.clone(),
                input,
                output,
                started_at,
                finished_at,
                status,
                error: error.as_ref().map(|e| e.to_string()),
                attempts,
                decision: None,
            },
            tokens,
            cost,
            retries: attempts - 1,
            error,
        }
    }

    /// Append a run to the history and fold its usage into the metadata.
    ///
    /// Returns the node output, or the node's error.
    pub fn record(&self, ctx: &mut ExecutionContext, run: NodeRun) -> Result<Value> {
        ctx.current_node = Some(run.entry.node_id.clone());
        if run.error.is_none() {
            ctx.add_usage(run.tokens, run.cost);
        }
        ctx.add_retries(run.retries);

        let output = run.entry.output.clone();
        ctx.record(run.entry);
        match run.error {
            Some(e) => Err(e),
            None => Ok(output),
        }
    }

    /// A single attempt under the node deadline, capped by the run's deadline.
    async fn attempt(
        &self,
        node: &AgentNode,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutput> {
        let timeout_ms = node
            .timeout_ms
            .unwrap_or(self.settings.default_node_timeout_ms);
        let node_limit = Duration::from_millis(timeout_ms);
        let (limit, expired) = match ctx.deadline {
            Some(deadline) if deadline.remaining() < node_limit => (
                deadline.remaining(),
                MaestroError::Timeout {
                    scope: format!("workflow {}", ctx.workflow_id),
                    timeout_ms: deadline.timeout_ms,
                },
            ),
            _ => (
                node_limit,
                MaestroError::Timeout {
                    scope: format!("node {}", node.id),
                    timeout_ms,
                },
            ),
        };
        let call = AssertUnwindSafe(self.executor.execute(node, input, ctx)).catch_unwind();

        match tokio::time::timeout(limit, call).await {
            Err(_) => Err(expired),
            Ok(Err(panic)) => Err(MaestroError::node(
                &node.id,
                format!("executor panicked: {}", panic_message(panic.as_ref())),
            )),
            Ok(Ok(Err(e))) => Err(match e {
                e @ (MaestroError::NodeExecution { .. } | MaestroError::Timeout { .. }) => e,
                other => MaestroError::node(&node.id, other.to_string()),
            }),
            Ok(Ok(Ok(output))) => Ok(output),
        }
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
