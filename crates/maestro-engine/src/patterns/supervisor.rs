use futures::future::BoxFuture;
use tracing::{debug, info};

use maestro_core::error::Result;
use maestro_core::event::WorkflowEvent;
use maestro_core::graph::{AgentNode, Pattern, WorkflowDefinition};
use maestro_core::traits::DecisionRequest;
use maestro_core::ExecutionContext;

use super::{chosen, entry_node, ExecutionEnv, PatternExecutor, PatternOutcome};

/// Upper bound on delegations per run.
pub const MAX_ITERATIONS: usize = 10;

/// Hierarchical: the entry node supervises, delegating to one specialist per
/// iteration through the supervisor policy. The supervisor itself is never
/// invoked as a node.
pub struct Supervisor;

impl PatternExecutor for Supervisor {
    fn pattern(&self) -> Pattern {
        Pattern::Supervisor
    }

    fn run<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        env: &'a ExecutionEnv,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<PatternOutcome>> {
        Box::pin(async move {
            let supervisor = entry_node(workflow)?;
            let specialists: Vec<&AgentNode> = workflow
                .nodes
                .iter()
                .filter(|n| n.id != supervisor.id)
                .collect();
            let policy = &env.policies.supervisor;
            let error_handling = workflow.config.error_handling;
            let approvals = &workflow.config.human_in_the_loop;
            info!(
                workflow_id = %workflow.id,
                supervisor = %supervisor.id,
                specialists = specialists.len(),
                policy = policy.name(),
                "Supervisor started"
            );

            let mut output = ctx.input.clone();
            for iteration in 1..=MAX_ITERATIONS {
                let decision = policy
                    .decide(DecisionRequest {
                        workflow,
                        current: supervisor,
                        candidates: &specialists,
                        output: &output,
                        succeeded: true,
                        context: ctx,
                    })
                    .await?;

                let Some(next_id) = decision.next_node.clone() else {
                    debug!(iteration, reasoning = %decision.reasoning, "Supervisor finished");
                    break;
                };
                let next = chosen(&specialists, &next_id, policy.name())?;

                if decision.needs_human_approval {
                    if approvals.enabled {
                        info!(node_id = %next.id, "Delegation awaits human approval");
                        env.runner.events().publish(WorkflowEvent::ApprovalRequired {
                            execution_id: ctx.execution_id.clone(),
                            decision: decision.clone(),
                        });
                        return Ok(PatternOutcome::PendingApproval { output, decision });
                    }
                    debug!(node_id = %next.id, "Approval requested but human-in-the-loop is off");
                }

                debug!(iteration, node_id = %next.id, reasoning = %decision.reasoning, "Delegating");
                let run = env
                    .runner
                    .invoke(next, output.clone(), ctx, error_handling)
                    .await
                    .with_decision(decision);
                if let Some(produced) = env.settle(ctx, run, error_handling)? {
                    output = produced;
                }

                if workflow.is_exit_point(&next.id) {
                    debug!(node_id = %next.id, "Reached exit point");
                    break;
                }
            }

            Ok(PatternOutcome::Completed(output))
        })
    }
}
