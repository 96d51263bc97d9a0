//! Default decision policies.
//!
//! These are deterministic heuristics. Swap them through [`Policies`] to route
//! with a model or any other strategy; the pattern executors only see the
//! `DecisionPolicy` trait.

use std::sync::Arc;

use futures::future::BoxFuture;

use maestro_core::error::Result;
use maestro_core::traits::{DecisionPolicy, DecisionRequest};
use maestro_core::types::Decision;

/// When the default supervisor policy asks for human approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalGate {
    /// Never request approval.
    #[default]
    Never,
    /// Request approval before delegating to a node listed in
    /// `humanInTheLoop.approvalPoints`.
    AtApprovalPoints,
}

/// Supervisor default: delegate to the first specialist that has not run yet.
#[derive(Debug, Clone, Default)]
pub struct FirstUnvisited {
    gate: ApprovalGate,
}

impl FirstUnvisited {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: ApprovalGate) -> Self {
        self.gate = gate;
        self
    }
}

impl DecisionPolicy for FirstUnvisited {
    fn name(&self) -> &str {
        "first_unvisited"
    }

    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(async move {
            let next = request
                .candidates
                .iter()
                .find(|n| !request.context.has_visited(&n.id));

            let Some(node) = next else {
                return Ok(Decision::stop("All specialists have contributed"));
            };

            let decision = Decision::goto(&node.id, format!("Delegating to {}", node.name));
            let gated = self.gate == ApprovalGate::AtApprovalPoints
                && request
                    .workflow
                    .config
                    .human_in_the_loop
                    .approval_points
                    .iter()
                    .any(|p| *p == node.id);

            Ok(if gated {
                decision.requiring_approval()
            } else {
                decision
            })
        })
    }
}

/// Adaptive default: take the first eligible hop.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCandidate;

impl DecisionPolicy for FirstCandidate {
    fn name(&self) -> &str {
        "first_candidate"
    }

    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(async move {
            Ok(match request.candidates.first() {
                Some(node) => Decision::goto(
                    &node.id,
                    format!("Hopping from {} to {}", request.current.id, node.id),
                )
                .with_confidence(1.0 / request.candidates.len() as f64),
                None => Decision::stop("No eligible next hop"),
            })
        })
    }
}

/// Handoff default: refer along the first outgoing edge whose condition holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeReferral;

impl DecisionPolicy for EdgeReferral {
    fn name(&self) -> &str {
        "edge_referral"
    }

    fn decide<'a>(&'a self, request: DecisionRequest<'a>) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(async move {
            let target = request
                .workflow
                .outgoing(&request.current.id)
                .find(|e| e.admits(request.output, request.succeeded) && request.is_candidate(&e.to));

            Ok(match target {
                Some(edge) => Decision::goto(
                    &edge.to,
                    format!("{} refers the case to {}", request.current.id, edge.to),
                ),
                None => Decision::stop(format!("{} resolved the case", request.current.id)),
            })
        })
    }
}

/// The three strategy slots consumed by the non-linear patterns.
#[derive(Clone)]
pub struct Policies {
    pub supervisor: Arc<dyn DecisionPolicy>,
    pub adaptive: Arc<dyn DecisionPolicy>,
    pub handoff: Arc<dyn DecisionPolicy>,
}

impl Policies {
    pub fn with_supervisor(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.supervisor = policy;
        self
    }

    pub fn with_adaptive(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.adaptive = policy;
        self
    }

    pub fn with_handoff(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.handoff = policy;
        self
    }
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            supervisor: Arc::new(FirstUnvisited::new()),
            adaptive: Arc::new(FirstCandidate),
            handoff: Arc::new(EdgeReferral),
        }
    }
}
