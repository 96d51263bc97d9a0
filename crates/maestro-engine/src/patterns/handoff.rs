use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use maestro_core::error::Result;
use maestro_core::graph::{AgentNode, Pattern, WorkflowDefinition};
use maestro_core::traits::DecisionRequest;
use maestro_core::ExecutionContext;

use super::{aborts, chosen, entry_node, ExecutionEnv, PatternExecutor, PatternOutcome};

/// Maximum length of a referral chain.
pub const MAX_HOPS: usize = 5;

/// Referral: each node either resolves the case or refers it to a node that
/// has not handled it yet. The referral decision is stored on the node's
/// history entry.
pub struct Handoff;

impl PatternExecutor for Handoff {
    fn pattern(&self) -> Pattern {
        Pattern::Handoff
    }

    fn run<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        env: &'a ExecutionEnv,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<PatternOutcome>> {
        Box::pin(async move {
            let policy = &env.policies.handoff;
            let error_handling = workflow.config.error_handling;
            info!(workflow_id = %workflow.id, policy = policy.name(), "Handoff started");

            let mut current = entry_node(workflow)?;
            let mut chain: Vec<&str> = Vec::with_capacity(MAX_HOPS);
            let mut output = ctx.input.clone();

            loop {
                chain.push(current.id.as_str());
                let run = env
                    .runner
                    .invoke(current, output.clone(), ctx, error_handling)
                    .await;

                let terminal = workflow.is_exit_point(&current.id)
                    || chain.len() >= MAX_HOPS
                    || run.error().is_some_and(|e| aborts(e, error_handling));
                if terminal {
                    if let Some(produced) = env.settle(ctx, run, error_handling)? {
                        output = produced;
                    }
                    debug!(chain = ?chain, "Handoff chain ended");
                    return Ok(PatternOutcome::Completed(output));
                }

                let succeeded = run.succeeded();
                let produced = run.output().cloned().unwrap_or(Value::Null);
                let candidates: Vec<&AgentNode> = workflow
                    .nodes
                    .iter()
                    .filter(|n| !chain.contains(&n.id.as_str()))
                    .collect();
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

                debug!(
                    node_id = %current.id,
                    handoff_to = ?decision.next_node,
                    reasoning = %decision.reasoning,
                    "Handoff decision"
                );
                let next_id = decision.next_node.clone();
                if let Some(value) = env.settle(ctx, run.with_decision(decision), error_handling)? {
                    output = value;
                }

                let Some(next_id) = next_id else {
                    debug!(chain = ?chain, "Handoff chain ended");
                    return Ok(PatternOutcome::Completed(output));
                };
                current = chosen(&candidates, &next_id, policy.name())?;
            }
        })
    }
}
