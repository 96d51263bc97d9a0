use std::collections::HashSet;

use futures::future::BoxFuture;
use tracing::{debug, info};

use maestro_core::error::Result;
use maestro_core::graph::{AgentEdge, AgentNode, Pattern, WorkflowDefinition};
use maestro_core::ExecutionContext;

use super::{entry_node, ExecutionEnv, PatternExecutor, PatternOutcome};

/// Pipeline: run the chain starting at the entry point, feeding each node the
/// previous node's output.
pub struct Sequential;

/// The linear order: entry point, then the first outgoing edge of each node
/// until a node has none or the chain loops back. Each node is paired with
/// the edge it was reached through.
fn chain_order(
    workflow: &WorkflowDefinition,
) -> Result<Vec<(&AgentNode, Option<&AgentEdge>)>> {
    let mut current = entry_node(workflow)?;
    let mut order = vec![(current, None)];
    let mut seen: HashSet<&str> = HashSet::from([current.id.as_str()]);

    loop {
        let Some(edge) = workflow.outgoing(&current.id).next() else {
            break;
        };
        if !seen.insert(edge.to.as_str()) {
            debug!(from = %edge.from, to = %edge.to, "Chain loops back, stopping");
            break;
        }
        let Some(next) = workflow.node(&edge.to) else {
            break;
        };
        order.push((next, Some(edge)));
        current = next;
    }
    Ok(order)
}

impl PatternExecutor for Sequential {
    fn pattern(&self) -> Pattern {
        Pattern::Sequential
    }

    fn run<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        env: &'a ExecutionEnv,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<PatternOutcome>> {
        Box::pin(async move {
            let order = chain_order(workflow)?;
            let error_handling = workflow.config.error_handling;
            info!(workflow_id = %workflow.id, steps = order.len(), "Running pipeline");

            // Failed steps leave the carried value untouched.
            let mut current = ctx.input.clone();
            for (node, via) in order {
                let input = match via {
                    Some(edge) => edge.carry(current.clone()),
                    None => current.clone(),
                };
                let run = env.runner.invoke(node, input, ctx, error_handling).await;
                if let Some(output) = env.settle(ctx, run, error_handling)? {
                    current = output;
                }
            }

            Ok(PatternOutcome::Completed(ctx.last_output()))
        })
    }
}
