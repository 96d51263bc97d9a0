use std::collections::HashSet;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use maestro_core::error::Result;
use maestro_core::graph::{AgentNode, Pattern, WorkflowDefinition};
use maestro_core::traits::DecisionRequest;
use maestro_core::ExecutionContext;

use super::{aborts, chosen, entry_node, ExecutionEnv, PatternExecutor, PatternOutcome};

/// Decentralized: each node hands over to a neighbour picked by the adaptive
/// policy, never revisiting a node, within a hop budget of twice the node
/// count.
pub struct AdaptiveNetwork;

/// Unvisited targets of the edges out of `current` that admit its result,
/// or the first unvisited node when none does.
fn next_hops<'w>(
    workflow: &'w WorkflowDefinition,
    current: &'w AgentNode,
    output: &Value,
    succeeded: bool,
    visited: &HashSet<&str>,
) -> Vec<&'w AgentNode> {
    let mut hops: Vec<&AgentNode> = Vec::new();
    for edge in workflow.outgoing(&current.id) {
        if !edge.admits(output, succeeded) || visited.contains(edge.to.as_str()) {
            continue;
        }
        if let Some(node) = workflow.node(&edge.to) {
            if !hops.iter().any(|n| n.id == node.id) {
                hops.push(node);
            }
        }
    }

    if hops.is_empty() {
        hops.extend(
            workflow
                .nodes
                .iter()
                .find(|n| !visited.contains(n.id.as_str())),
        );
    }
    hops
}

impl PatternExecutor for AdaptiveNetwork {
    fn pattern(&self) -> Pattern {
        Pattern::AdaptiveNetwork
    }

    fn run<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        env: &'a ExecutionEnv,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<PatternOutcome>> {
        Box::pin(async move {
            let policy = &env.policies.adaptive;
            let error_handling = workflow.config.error_handling;
            let budget = 2 * workflow.nodes.len();
            info!(workflow_id = %workflow.id, budget, policy = policy.name(), "Adaptive network started");

            let mut current = entry_node(workflow)?;
            let mut visited: HashSet<&str> = HashSet::new();
            let mut output = ctx.input.clone();

            for hop in 1..=budget {
                visited.insert(current.id.as_str());
                let run = env
                    .runner
                    .invoke(current, output.clone(), ctx, error_handling)
                    .await;

                let at_exit = workflow.is_exit_point(&current.id);
                if at_exit || run.error().is_some_and(|e| aborts(e, error_handling)) {
                    if let Some(produced) = env.settle(ctx, run, error_handling)? {
                        output = produced;
                    }
                    debug!(hop, node_id = %current.id, "Reached exit point");
                    return Ok(PatternOutcome::Completed(output));
                }

                let succeeded = run.succeeded();
                let produced = run.output().cloned().unwrap_or(Value::Null);
                let candidates = next_hops(workflow, current, &produced, succeeded, &visited);
                let decision = match policy
                    .decide(DecisionRequest {
                        workflow,
                        current,
                        candidates: &candidates,
                        output: &produced,
                        succeeded,
                        context: ctx,
                    })
                    .await
                {
                    Ok(decision) => decision,
                    Err(e) => {
                        env.settle(ctx, run, error_handling)?;
                        return Err(e);
                    }
                };

                let next_id = decision.next_node.clone();
                if let Some(value) = env.settle(ctx, run.with_decision(decision), error_handling)? {
                    output = value;
                }

                let Some(next_id) = next_id else {
                    debug!(hop, node_id = %current.id, "No next hop");
                    return Ok(PatternOutcome::Completed(output));
                };
                current = chosen(&candidates, &next_id, policy.name())?;
            }

            debug!(budget, "Hop budget exhausted");
            Ok(PatternOutcome::Completed(output))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::test_support::{context, env, env_with, visited};
    use crate::policy::Policies;
    use maestro_core::graph::{AgentEdge, ErrorHandling};
    use maestro_core::types::Decision;
    use maestro_core::{MaestroError, WorkflowConfig};
    use maestro_test_utils::{fixtures, MockExecutor, ScriptedPolicy};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_conditional_edge_routes() {
        let wf = fixtures::support_network();
        let mock = MockExecutor::new().with_output("triage", json!({"category": "tech"}));
        let env = env(Arc::new(mock));
        let mut ctx = context(&wf, json!({"ticket": "vpn down"}));

        let outcome = AdaptiveNetwork.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(visited(&ctx), vec!["triage", "tech", "close"]);
        assert!(matches!(outcome, PatternOutcome::Completed(ref v) if v["node"] == "close"));
        assert_eq!(
            ctx.history()[0].decision.as_ref().and_then(|d| d.next_node.as_deref()),
            Some("tech")
        );
        // Exit point returns without consulting the policy.
        assert!(ctx.history()[2].decision.is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_first_unvisited() {
        let wf = fixtures::support_network();
        // No category in the output, so neither conditional edge matches.
        let env = env(Arc::new(MockExecutor::new()));
        let mut ctx = context(&wf, Value::Null);

        AdaptiveNetwork.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(visited(&ctx), vec!["triage", "billing", "close"]);
    }

    #[tokio::test]
    async fn test_never_revisits() {
        let nodes = ["a", "b", "c"].map(|id| AgentNode::new(id, id));
        let wf = WorkflowDefinition::new("ring", "Ring", Pattern::AdaptiveNetwork)
            .with_nodes(nodes)
            .with_chain(&["a", "b", "c", "a"])
            .with_entry_point("a");
        let env = env(Arc::new(MockExecutor::new()));
        let mut ctx = context(&wf, Value::Null);

        AdaptiveNetwork.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(visited(&ctx), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_policy_cannot_escape_candidates() {
        let wf = fixtures::support_network();
        let policy = ScriptedPolicy::new(vec![Decision::goto("triage", "loop")]);
        let env = env_with(
            Arc::new(MockExecutor::new()),
            Policies::default().with_adaptive(Arc::new(policy)),
        );
        let mut ctx = context(&wf, Value::Null);

        let err = AdaptiveNetwork.run(&wf, &env, &mut ctx).await.unwrap_err();

        assert!(matches!(err, MaestroError::InvalidDecision { .. }));
        assert_eq!(ctx.history().len(), 1);
    }

    #[tokio::test]
    async fn test_on_failure_edge() {
        let wf = WorkflowDefinition::new("recover", "Recover", Pattern::AdaptiveNetwork)
            .with_nodes(["fetch", "retry", "report"].map(|id| AgentNode::new(id, id)))
            .with_edge(AgentEdge::on_success("fetch", "report"))
            .with_edge(AgentEdge::on_failure("fetch", "retry"))
            .with_edge(AgentEdge::new("retry", "report"))
            .with_entry_point("fetch")
            .with_exit_points(vec!["report".into()]);
        let env = env(Arc::new(MockExecutor::new().failing("fetch", "404")));
        let mut ctx = context(&wf, Value::Null);

        AdaptiveNetwork.run(&wf, &env, &mut ctx).await.unwrap();

        assert_eq!(visited(&ctx), vec!["fetch", "retry", "report"]);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts() {
        let wf = fixtures::support_network().with_config(WorkflowConfig {
            error_handling: ErrorHandling::FailFast,
            ..Default::default()
        });
        let env = env(Arc::new(MockExecutor::new().failing("triage", "down")));
        let mut ctx = context(&wf, Value::Null);

        let err = AdaptiveNetwork.run(&wf, &env, &mut ctx).await.unwrap_err();
        assert!(matches!(err, MaestroError::NodeExecution { .. }));
        assert_eq!(visited(&ctx), vec!["triage"]);
    }
}
