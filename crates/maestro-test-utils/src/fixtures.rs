//! Ready-made workflow definitions, one per pattern.

use maestro_core::graph::{AgentEdge, AgentNode, Pattern, WorkflowConfig, WorkflowDefinition};

fn nodes(ids: &[&str]) -> Vec<AgentNode> {
    ids.iter().map(|id| AgentNode::new(*id, title(id))).collect()
}

fn title(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// research → writer → editor → seo → publisher
pub fn content_pipeline() -> WorkflowDefinition {
    let ids = ["research", "writer", "editor", "seo", "publisher"];
    WorkflowDefinition::new("content-pipeline", "Content Pipeline", Pattern::Sequential)
        .with_nodes(nodes(&ids))
        .with_chain(&ids)
        .with_entry_point("research")
        .with_exit_points(vec!["publisher".into()])
}

/// Five independent analysts fanned out in batches of `max_concurrency`.
pub fn analyst_fanout(max_concurrency: Option<usize>) -> WorkflowDefinition {
    WorkflowDefinition::new("analyst-fanout", "Analyst Fan-out", Pattern::Concurrent)
        .with_nodes(nodes(&["market", "legal", "finance", "tech", "risk"]))
        .with_entry_point("market")
        .with_config(WorkflowConfig {
            max_concurrency,
            ..Default::default()
        })
}

/// A supervisor at the entry point with four specialists.
pub fn supervised_team() -> WorkflowDefinition {
    WorkflowDefinition::new("supervised-team", "Supervised Team", Pattern::Supervisor)
        .with_nodes(nodes(&["supervisor", "researcher", "coder", "reviewer", "writer"]))
        .with_entry_point("supervisor")
}

/// triage routes to billing or tech on a `category` field; both end at close.
pub fn support_network() -> WorkflowDefinition {
    WorkflowDefinition::new("support-network", "Support Network", Pattern::AdaptiveNetwork)
        .with_nodes(nodes(&["triage", "billing", "tech", "close"]))
        .with_edge(AgentEdge::conditional("triage", "billing", r#"category == "billing""#))
        .with_edge(AgentEdge::conditional("triage", "tech", r#"category == "tech""#))
        .with_edge(AgentEdge::new("billing", "close"))
        .with_edge(AgentEdge::new("tech", "close"))
        .with_entry_point("triage")
        .with_exit_points(vec!["close".into()])
}

/// frontdesk → specialist → escalation, referred along edges.
pub fn referral_desk() -> WorkflowDefinition {
    WorkflowDefinition::new("referral-desk", "Referral Desk", Pattern::Handoff)
        .with_nodes(nodes(&["frontdesk", "specialist", "escalation"]))
        .with_chain(&["frontdesk", "specialist", "escalation"])
        .with_entry_point("frontdesk")
        .with_exit_points(vec!["escalation".into()])
}

/// Diamond: fetch → (summarize, classify) → report.
pub fn diamond_dag() -> WorkflowDefinition {
    WorkflowDefinition::new("diamond", "Diamond DAG", Pattern::Custom)
        .with_nodes(nodes(&["fetch", "summarize", "classify", "report"]))
        .with_edge(AgentEdge::new("fetch", "summarize"))
        .with_edge(AgentEdge::new("fetch", "classify"))
        .with_edge(AgentEdge::new("summarize", "report"))
        .with_edge(AgentEdge::new("classify", "report"))
        .with_entry_point("fetch")
        .with_exit_points(vec!["report".into()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_shapes() {
        assert_eq!(content_pipeline().nodes.len(), 5);
        assert_eq!(content_pipeline().edges.len(), 4);
        assert_eq!(analyst_fanout(Some(4)).config.max_concurrency, Some(4));
        assert_eq!(supervised_team().nodes[0].name, "Supervisor");
        assert_eq!(diamond_dag().edges.len(), 4);
    }
}
