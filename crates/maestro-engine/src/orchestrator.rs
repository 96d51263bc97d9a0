use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use maestro_core::config::AppConfig;
use maestro_core::error::{MaestroError, Result};
use maestro_core::event::{EventBus, WorkflowEvent};
use maestro_core::graph::WorkflowDefinition;
use maestro_core::traits::{NodeExecutor, WorkflowStore};
use maestro_core::types::{
    new_execution_id, ExecutionMetrics, ExecutionRecord, ExecutionResult, ExecutionStatus,
};
use maestro_core::{Deadline, ExecutionContext};

use crate::patterns::{ExecutionEnv, PatternOutcome, PatternTable};
use crate::policy::Policies;
use crate::registry::WorkflowRegistry;
use crate::runner::{NodeRunner, RunnerSettings};
use crate::store::{open_store, InMemoryStore};

/// Per-call options for [`Orchestrator::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Caller-chosen execution id. A fresh UUID is used when absent.
    pub execution_id: Option<String>,
}

impl ExecuteOptions {
    pub fn with_execution_id(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: Some(execution_id.into()),
        }
    }
}

/// Public entry point of the engine.
///
/// Owns the registry, the pattern table and the node execution adapter.
/// Each `execute` call gets its own `ExecutionContext`. The most recent
/// finished runs are kept in memory (`[engine] retained_executions`), and
/// runs of workflows with `checkpointEnabled` are written to the store.
pub struct Orchestrator {
    registry: WorkflowRegistry,
    patterns: PatternTable,
    env: ExecutionEnv,
    events: Arc<EventBus>,
    default_workflow_timeout_ms: Option<u64>,
    recent: RwLock<VecDeque<ExecutionRecord>>,
    retained_executions: usize,
    running: Mutex<HashSet<String>>,
}

/// Time allowed past the workflow deadline for a pattern to unwind after
/// its in-flight nodes have been cut off.
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    executor: Arc<dyn NodeExecutor>,
    config: AppConfig,
    store: Option<Arc<dyn WorkflowStore>>,
    policies: Policies,
    patterns: PatternTable,
    events: Option<Arc<EventBus>>,
}

impl OrchestratorBuilder {
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this store instead of the one selected by `[store]`.
    pub fn with_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_policies(mut self, policies: Policies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_patterns(mut self, patterns: PatternTable) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(mut self) -> Result<Orchestrator> {
        let store = match self.store.take() {
            Some(store) => store,
            None => open_store(&self.config.store)?,
        };
        Ok(self.build_with(store))
    }

    fn build_with(self, store: Arc<dyn WorkflowStore>) -> Orchestrator {
        let events = self.events.unwrap_or_default();
        let runner = NodeRunner::new(
            self.executor,
            RunnerSettings::from_config(&self.config),
            events.clone(),
        );

        Orchestrator {
            registry: WorkflowRegistry::new(store),
            patterns: self.patterns,
            env: ExecutionEnv::new(runner, self.policies),
            events,
            default_workflow_timeout_ms: self.config.engine.default_workflow_timeout_ms,
            recent: RwLock::new(VecDeque::new()),
            retained_executions: self.config.engine.retained_executions,
            running: Mutex::new(HashSet::new()),
        }
    }
}

impl Orchestrator {
    pub fn builder(executor: Arc<dyn NodeExecutor>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            executor,
            config: AppConfig::default(),
            store: None,
            policies: Policies::default(),
            patterns: PatternTable::with_defaults(),
            events: None,
        }
    }

    /// An orchestrator with default config, policies and an in-memory store.
    pub fn new(executor: Arc<dyn NodeExecutor>) -> Self {
        Self::builder(executor).build_with(Arc::new(InMemoryStore::new()))
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Validate and store a definition.
    pub fn register_workflow(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition> {
        self.registry.register(workflow)
    }

    pub fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        self.registry.get(id)
    }

    pub fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        self.registry.list()
    }

    pub fn delete_workflow(&self, id: &str) -> Result<bool> {
        self.registry.delete(id)
    }

    /// Run a registered workflow to a terminal status.
    ///
    /// Fails only when the run cannot start: unknown workflow, no executor
    /// for its pattern, or an execution id already in use. Everything that
    /// happens once the run starts, including node failures and deadlines,
    /// is reported through `ExecutionResult::status`.
    pub async fn execute(
        &self,
        workflow_id: &str,
        input: Value,
        options: ExecuteOptions,
    ) -> Result<ExecutionResult> {
        let workflow = self
            .registry
            .get(workflow_id)?
            .ok_or_else(|| MaestroError::WorkflowNotFound(workflow_id.to_string()))?;
        let pattern = self.patterns.get(workflow.pattern)?;
        let execution_id = options.execution_id.unwrap_or_else(new_execution_id);
        self.reserve(&execution_id)?;

        let timeout_ms = workflow
            .config
            .timeout_ms
            .or(self.default_workflow_timeout_ms);
        let mut ctx = ExecutionContext::new(&workflow.id, &execution_id, input, workflow.pattern);
        if let Some(ms) = timeout_ms {
            ctx = ctx.with_deadline(Deadline::after_ms(ms));
        }
        info!(
            workflow_id = %workflow.id,
            execution_id = %execution_id,
            pattern = %workflow.pattern,
            "Execution started"
        );
        self.events.publish(WorkflowEvent::ExecutionStarted {
            execution_id: execution_id.clone(),
            workflow_id: workflow.id.clone(),
            pattern: workflow.pattern,
        });

        // Node calls are cut off at the deadline by the runner and recorded
        // as timed out. This only catches time spent outside node calls.
        let clock = Instant::now();
        let deadline = ctx.deadline;
        let run = pattern.run(&workflow, &self.env, &mut ctx);
        let outcome = match deadline {
            Some(d) => match tokio::time::timeout_at((d.at + DEADLINE_GRACE).into(), run).await {
                Ok(outcome) => outcome,
                Err(_) => Err(MaestroError::Timeout {
                    scope: format!("workflow {}", workflow.id),
                    timeout_ms: d.timeout_ms,
                }),
            },
            None => run.await,
        };

        let (status, output, error, pending_decision) = match outcome {
            Ok(PatternOutcome::Completed(output)) => (ExecutionStatus::Completed, output, None, None),
            Ok(PatternOutcome::PendingApproval { output, decision }) => {
                (ExecutionStatus::PendingApproval, output, None, Some(decision))
            }
            Err(e) => {
                let status = if e.is_timeout() {
                    ExecutionStatus::Timeout
                } else {
                    ExecutionStatus::Failed
                };
                (status, pattern.partial_output(&workflow, &ctx), Some(e.to_string()), None)
            }
        };

        let result = ExecutionResult {
            execution_id: execution_id.clone(),
            workflow_id: workflow.id.clone(),
            status,
            output,
            metrics: ExecutionMetrics {
                duration_ms: clock.elapsed().as_millis() as u64,
                nodes_executed: ctx.nodes_executed(),
                total_tokens: ctx.metadata.total_tokens,
                total_cost: ctx.metadata.total_cost,
                retries: ctx.metadata.retries,
            },
            history: ctx.history().to_vec(),
            error,
            pending_decision,
            started_at: ctx.metadata.start_time,
            finished_at: Utc::now(),
        };

        match &result.error {
            Some(error) => warn!(
                execution_id = %execution_id,
                %status,
                error = %error,
                nodes = result.metrics.nodes_executed,
                "Execution ended"
            ),
            None => info!(
                execution_id = %execution_id,
                %status,
                nodes = result.metrics.nodes_executed,
                duration_ms = result.metrics.duration_ms,
                tokens = result.metrics.total_tokens,
                "Execution ended"
            ),
        }
        self.events.publish(WorkflowEvent::ExecutionFinished {
            execution_id: execution_id.clone(),
            status,
            output: result.output.clone(),
        });

        self.finish(
            ExecutionRecord {
                context: ctx,
                result: result.clone(),
            },
            workflow.config.checkpoint_enabled,
        );
        Ok(result)
    }

    /// Context of a finished execution.
    pub fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionContext>> {
        Ok(self.record(execution_id)?.map(|r| r.context))
    }

    /// Result of a finished execution.
    pub fn get_result(&self, execution_id: &str) -> Result<Option<ExecutionResult>> {
        Ok(self.record(execution_id)?.map(|r| r.result))
    }

    fn record(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let cached = self
            .recent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.result.execution_id == execution_id)
            .cloned();
        match cached {
            Some(record) => Ok(Some(record)),
            None => self.registry.store().get_execution(execution_id),
        }
    }

    /// Ids of runs in flight. The set stays usable after a panic elsewhere
    /// poisoned the lock, so a finished run can always release its id.
    fn running(&self) -> MutexGuard<'_, HashSet<String>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim an execution id for a new run.
    fn reserve(&self, execution_id: &str) -> Result<()> {
        let duplicate = || MaestroError::DuplicateExecution(execution_id.to_string());
        if self.record(execution_id)?.is_some() {
            return Err(duplicate());
        }
        if !self.running().insert(execution_id.to_string()) {
            return Err(duplicate());
        }
        Ok(())
    }

    fn finish(&self, record: ExecutionRecord, persist: bool) {
        let execution_id = record.result.execution_id.clone();
        if persist {
            if let Err(e) = self.registry.store().save_execution(&record) {
                warn!(execution_id = %execution_id, error = %e, "Failed to persist execution");
            }
        }
        if self.retained_executions > 0 {
            let mut recent = self.recent.write().unwrap_or_else(PoisonError::into_inner);
            if recent.len() >= self.retained_executions {
                recent.pop_front();
            }
            recent.push_back(record);
        }
        self.running().remove(&execution_id);
    }
}
