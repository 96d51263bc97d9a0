//! Shared mocks and fixtures for Maestro tests.

pub mod fixtures;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use maestro_core::error::{MaestroError, Result};
use maestro_core::graph::AgentNode;
use maestro_core::traits::{DecisionPolicy, DecisionRequest, NodeExecutor};
use maestro_core::types::{Decision, NodeOutput};
use maestro_core::ExecutionContext;

/// Scripted behaviour for one node id.
#[derive(Debug, Clone, Default)]
struct MockNode {
    delay: Option<Duration>,
    /// Fail this many attempts before succeeding.
    failures: usize,
    message: Option<String>,
    output: Option<Value>,
    panics: bool,
}

/// A `NodeExecutor` driven by per-node scripts.
///
/// Unscripted nodes succeed immediately with `{"node": <id>, "input": <input>}`.
/// Every call is recorded, and the peak number of concurrently running
/// invocations is tracked.
pub struct MockExecutor {
    script: HashMap<String, MockNode>,
    tokens: u64,
    cost: f64,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            tokens: 0,
            cost: 0.0,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn entry(&mut self, node_id: &str) -> &mut MockNode {
        self.script.entry(node_id.to_string()).or_default()
    }

    /// Report this usage for every successful call.
    pub fn with_usage(mut self, tokens: u64, cost: f64) -> Self {
        self.tokens = tokens;
        self.cost = cost;
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, node_id: &str, ms: u64) -> Self {
        self.entry(node_id).delay = Some(Duration::from_millis(ms));
        self
    }

    /// Always fail.
    pub fn failing(mut self, node_id: &str, message: &str) -> Self {
        let node = self.entry(node_id);
        node.failures = usize::MAX;
        node.message = Some(message.to_string());
        self
    }

    /// Fail the first `times` attempts, then succeed.
    pub fn flaky(mut self, node_id: &str, times: usize) -> Self {
        let node = self.entry(node_id);
        node.failures = times;
        node.message = Some("transient failure".to_string());
        self
    }

    /// Answer with a fixed output.
    pub fn with_output(mut self, node_id: &str, output: Value) -> Self {
        self.entry(node_id).output = Some(output);
        self
    }

    /// Panic inside the executor.
    pub fn panicking(mut self, node_id: &str) -> Self {
        self.entry(node_id).panics = true;
        self
    }

    /// Node ids in call order (one per attempt).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, node_id: &str) -> usize {
        self.calls().iter().filter(|c| *c == node_id).count()
    }

    /// Peak number of invocations running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeExecutor for MockExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a AgentNode,
        input: Value,
        _ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let attempt = {
                let mut calls = self
                    .calls
                    .lock()
                    .map_err(|e| MaestroError::node(&node.id, e.to_string()))?;
                calls.push(node.id.clone());
                calls.iter().filter(|c| **c == node.id).count()
            };

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let script = self.script.get(&node.id).cloned().unwrap_or_default();
            if let Some(delay) = script.delay {
                tokio::time::sleep(delay).await;
            }
            if script.panics {
                panic!("mock node {} panicked", node.id);
            }
            if attempt <= script.failures {
                let message = script.message.unwrap_or_else(|| "mock failure".into());
                return Err(MaestroError::node(&node.id, message));
            }

            let output = script
                .output
                .unwrap_or_else(|| json!({ "node": node.id, "input": input }));
            Ok(NodeOutput::new(output).with_usage(self.tokens, self.cost))
        })
    }
}

/// A `DecisionPolicy` that replays a fixed list of decisions, then stops.
pub struct ScriptedPolicy {
    decisions: Mutex<VecDeque<Decision>>,
    seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPolicy {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Candidate ids offered on each call.
    pub fn seen_candidates(&self) -> Vec<Vec<String>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl DecisionPolicy for ScriptedPolicy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(async move {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.candidates.iter().map(|n| n.id.clone()).collect());
            }
            let next = self
                .decisions
                .lock()
                .map_err(|e| MaestroError::Store(e.to_string()))?
                .pop_front();
            Ok(next.unwrap_or_else(|| Decision::stop("script exhausted")))
        })
    }
}
