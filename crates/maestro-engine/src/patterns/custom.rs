use std::collections::{HashMap, HashSet, VecDeque};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info, warn};

use maestro_core::error::Result;
use maestro_core::graph::{AgentEdge, Pattern, WorkflowDefinition};
use maestro_core::{ExecutionContext, HistoryEntry};

use super::{entry_node, ExecutionEnv, PatternExecutor, PatternOutcome};

/// Programmatic DAG: edges are dataflow dependencies.
///
/// A node runs once every edge into it comes from a node that already ran.
/// Its input is the workflow input for a source node, the single upstream
/// value, or an array of upstream values in edge order. Successors are
/// queued along edges whose condition admits the result.
pub struct CustomDag;

impl PatternExecutor for CustomDag {
    fn pattern(&self) -> Pattern {
        Pattern::Custom
    }

    fn run<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        env: &'a ExecutionEnv,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<PatternOutcome>> {
        Box::pin(async move {
            let error_handling = workflow.config.error_handling;
            let entry = entry_node(workflow)?;
            info!(workflow_id = %workflow.id, nodes = workflow.nodes.len(), "Running DAG");

            let mut results: HashMap<&str, Value> = HashMap::new();
            let mut queue: VecDeque<&str> = VecDeque::from([entry.id.as_str()]);
            // Consecutive requeues without progress.
            let mut idle = 0usize;

            while let Some(id) = queue.pop_front() {
                if results.contains_key(id) {
                    continue;
                }
                let deps: Vec<&AgentEdge> = workflow.incoming(id).collect();
                if !deps.iter().all(|e| results.contains_key(e.from.as_str())) {
                    queue.push_back(id);
                    idle += 1;
                    if idle > queue.len() {
                        warn!(pending = ?queue, "DAG stalled on unmet dependencies");
                        break;
                    }
                    continue;
                }
                idle = 0;

                let Some(node) = workflow.node(id) else {
                    continue;
                };
                let input = {
                    let upstream = |edge: &AgentEdge| {
                        edge.carry(results.get(edge.from.as_str()).cloned().unwrap_or(Value::Null))
                    };
                    match deps.as_slice() {
                        [] => ctx.input.clone(),
                        [edge] => upstream(edge),
                        many => Value::Array(many.iter().map(|e| upstream(e)).collect()),
                    }
                };

                let run = env.runner.invoke(node, input, ctx, error_handling).await;
                let succeeded = run.succeeded();
                let output = env
                    .settle(ctx, run, error_handling)?
                    .unwrap_or(Value::Null);

                for edge in workflow.outgoing(&node.id) {
                    let to = edge.to.as_str();
                    if edge.admits(&output, succeeded)
                        && !results.contains_key(to)
                        && !queue.contains(&to)
                    {
                        queue.push_back(to);
                    }
                }
                results.insert(node.id.as_str(), output);
            }

            for node in &workflow.nodes {
                if !results.contains_key(node.id.as_str()) {
                    debug!(node_id = %node.id, "Node never became ready");
                    ctx.record(HistoryEntry::skipped(
                        &node.id,
                        "dependencies did not complete",
                    ));
                }
            }

            Ok(PatternOutcome::Completed(exit_values(workflow, &results, ctx)))
        })
    }
}

/// Exit-point values in `exitPoints` order; a lone exit point yields its
/// value directly, no exit points yield the last output.
fn exit_values(
    workflow: &WorkflowDefinition,
    results: &HashMap<&str, Value>,
    ctx: &ExecutionContext,
) -> Value {
    let mut values: Vec<Value> = workflow
        .exit_points
        .iter()
        .map(|id| results.get(id.as_str()).cloned().unwrap_or(Value::Null))
        .collect();

    match values.len() {
        0 => ctx.last_output(),
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_support::{context, env, visited};
    use maestro_core::graph::{AgentNode, ErrorHandling};
    use maestro_core::{MaestroError, NodeStatus, WorkflowConfig};
    use maestro_test_utils::{fixtures, MockExecutor};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_diamond_runs_each_node_once() {
        let wf = fixtures::diamond_dag();
        let mock = Arc::new(MockExecutor::new().with_delay("summarize", 10));
        let env = env(mock.clone());
        let mut ctx = context(&wf, json!({"url": "https://example.com"}));

        let outcome = CustomDag.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(visited(&ctx), vec!["fetch", "summarize", "classify", "report"]);
        for id in ["fetch", "summarize", "classify", "report"] {
            assert_eq!(mock.call_count(id), 1);
        }
        // Two incoming edges: the report gets an array in edge order.
        let report_input = &ctx.history()[3].input;
        assert_eq!(report_input[0]["node"], "summarize");
        assert_eq!(report_input[1]["node"], "classify");
        // Single exit point collapses to a value.
        let PatternOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(output["node"], "report");
    }

    #[tokio::test]
    async fn test_source_gets_workflow_input() {
        let wf = fixtures::diamond_dag();
        let env = env(Arc::new(MockExecutor::new()));
        let mut ctx = context(&wf, json!("seed"));

        CustomDag.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(ctx.history()[0].input, json!("seed"));
        assert_eq!(ctx.history()[1].input["node"], "fetch");
    }

    #[tokio::test]
    async fn test_multiple_exit_points_in_listed_order() {
        let wf = fixtures::diamond_dag()
            .with_exit_points(vec!["classify".into(), "summarize".into()]);
        let env = env(Arc::new(MockExecutor::new()));
        let mut ctx = context(&wf, Value::Null);

        let outcome = CustomDag.run(&wf, &env, &mut ctx).await.unwrap();

        let PatternOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(output[0]["node"], "classify");
        assert_eq!(output[1]["node"], "summarize");
    }

    #[tokio::test]
    async fn test_unreachable_dependency_is_skipped() {
        // `orphan` feeds `report` but nothing leads to it from the entry.
        let wf = WorkflowDefinition::new("partial", "Partial", Pattern::Custom)
            .with_nodes(["start", "orphan", "report"].map(|id| AgentNode::new(id, id)))
            .with_edge(AgentEdge::new("start", "report"))
            .with_edge(AgentEdge::new("orphan", "report"))
            .with_entry_point("start")
            .with_exit_points(vec!["report".into()]);
        let env = env(Arc::new(MockExecutor::new()));
        let mut ctx = context(&wf, Value::Null);

        let outcome = CustomDag.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(outcome, PatternOutcome::Completed(Value::Null));
        assert_eq!(ctx.nodes_executed(), 1);
        let skipped: Vec<_> = ctx
            .history()
            .iter()
            .filter(|e| e.status == NodeStatus::Skipped)
            .map(|e| e.node_id.as_str())
            .collect();
        assert_eq!(skipped, vec!["orphan", "report"]);
    }

    #[tokio::test]
    async fn test_transform_wraps_upstream() {
        let wf = WorkflowDefinition::new("pair", "Pair", Pattern::Custom)
            .with_nodes(["a", "b"].map(|id| AgentNode::new(id, id)))
            .with_edge(AgentEdge::new("a", "b").transforming())
            .with_entry_point("a")
            .with_exit_points(vec!["b".into()]);
        let env = env(Arc::new(MockExecutor::new().with_output("a", json!(7))));
        let mut ctx = context(&wf, Value::Null);

        CustomDag.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(ctx.history()[1].input, json!({"from": "a", "output": 7}));
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let wf = fixtures::diamond_dag().with_config(WorkflowConfig {
            error_handling: ErrorHandling::FailFast,
            ..Default::default()
        });
        let env = env(Arc::new(MockExecutor::new().failing("fetch", "offline")));
        let mut ctx = context(&wf, Value::Null);

        let err = CustomDag.run(&wf, &env, &mut ctx).await.unwrap_err();

        assert!(matches!(err, MaestroError::NodeExecution { .. }));
        assert_eq!(visited(&ctx), vec!["fetch"]);
    }
}
