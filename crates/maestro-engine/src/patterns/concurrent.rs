use futures::future::{join_all, BoxFuture};
use serde_json::{json, Value};
use tracing::{debug, info};

use maestro_core::error::Result;
use maestro_core::event::WorkflowEvent;
use maestro_core::graph::{Pattern, WorkflowDefinition};
use maestro_core::{ExecutionContext, HistoryEntry};

use super::{ExecutionEnv, PatternExecutor, PatternOutcome};

/// Fan-out/fan-in: every node receives the workflow input, in batches of at
/// most `maxConcurrency`, with a barrier between batches.
///
/// Nodes of a batch run concurrently against a shared read-only view of the
/// context. Their runs are folded into the history once the whole batch has
/// finished, in declaration order, so the context has a single writer.
pub struct Concurrent;

impl PatternExecutor for Concurrent {
    fn pattern(&self) -> Pattern {
        Pattern::Concurrent
    }

    fn run<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        env: &'a ExecutionEnv,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<PatternOutcome>> {
        Box::pin(async move {
            let error_handling = workflow.config.error_handling;
            let size = workflow
                .config
                .max_concurrency
                .unwrap_or(workflow.nodes.len())
                .max(1);
            let batches: Vec<_> = workflow.nodes.chunks(size).collect();
            ctx.set_state("concurrent.batches", json!(batches.len()));
            info!(
                workflow_id = %workflow.id,
                nodes = workflow.nodes.len(),
                batches = batches.len(),
                "Fanning out"
            );

            let input = ctx.input.clone();
            for (i, batch) in batches.iter().enumerate() {
                ctx.set_state("concurrent.batch", json!(i + 1));
                env.runner.events().publish(WorkflowEvent::BatchStarted {
                    execution_id: ctx.execution_id.clone(),
                    batch: i + 1,
                    size: batch.len(),
                });
                debug!(batch = i + 1, size = batch.len(), "Batch started");

                let shared: &ExecutionContext = ctx;
                let runs = join_all(
                    batch
                        .iter()
                        .map(|node| env.runner.invoke(node, input.clone(), shared, error_handling)),
                )
                .await;

                // Barrier reached: fold every run before deciding to abort.
                let mut abort = None;
                for run in runs {
                    if let Err(e) = env.settle(ctx, run, error_handling) {
                        abort.get_or_insert(e);
                    }
                }
                if let Some(e) = abort {
                    return Err(e);
                }
            }

            Ok(PatternOutcome::Completed(aggregate(workflow, ctx.history(), batches.len())))
        })
    }

    /// The aggregate over the batches that ran, so callers see the same shape
    /// whether or not the run finished.
    fn partial_output(&self, workflow: &WorkflowDefinition, ctx: &ExecutionContext) -> Value {
        let batches = ctx
            .get_state("concurrent.batch")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        aggregate(workflow, ctx.history(), batches)
    }
}

/// Per-node results in declaration order plus a one-line summary.
fn aggregate(workflow: &WorkflowDefinition, history: &[HistoryEntry], batches: usize) -> Value {
    let results: Vec<Value> = workflow
        .nodes
        .iter()
        .filter_map(|node| {
            let entry = history.iter().rev().find(|e| e.node_id == node.id)?;
            Some(json!({
                "nodeId": node.id,
                "agent": node.name,
                "status": entry.status,
                "output": entry.output,
            }))
        })
        .collect();

    let completed = results
        .iter()
        .filter(|r| r["status"] == "success")
        .count();

    json!({
        "results": results,
        "summary": format!(
            "{} of {} agents completed in {} batch(es)",
            completed,
            workflow.nodes.len(),
            batches
        ),
    })
}
