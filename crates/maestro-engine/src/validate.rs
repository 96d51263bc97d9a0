//! Structural validation of workflow definitions.

use std::collections::{HashMap, HashSet, VecDeque};

use maestro_core::error::ValidationError;
use maestro_core::graph::{Pattern, WorkflowDefinition};

/// Check every structural invariant, reporting the first one violated.
pub fn validate_workflow(workflow: &WorkflowDefinition) -> Result<(), ValidationError> {
    if workflow.id.trim().is_empty() {
        return Err(ValidationError::MissingField("id"));
    }
    if workflow.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if workflow.nodes.is_empty() {
        return Err(ValidationError::EmptyNodes);
    }

    let mut ids = HashSet::new();
    for node in &workflow.nodes {
        if node.id.trim().is_empty() {
            return Err(ValidationError::MissingField("nodes[].id"));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(ValidationError::DuplicateNode(node.id.clone()));
        }
    }

    if workflow.entry_point.is_empty() {
        return Err(ValidationError::MissingField("entryPoint"));
    }
    if !ids.contains(workflow.entry_point.as_str()) {
        return Err(ValidationError::UnknownEntryPoint(workflow.entry_point.clone()));
    }
    if let Some(exit) = workflow
        .exit_points
        .iter()
        .find(|e| !ids.contains(e.as_str()))
    {
        return Err(ValidationError::UnknownExitPoint(exit.clone()));
    }

    for edge in &workflow.edges {
        for end in [&edge.from, &edge.to] {
            if !ids.contains(end.as_str()) {
                return Err(ValidationError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: end.clone(),
                });
            }
        }
    }

    if workflow.config.max_concurrency == Some(0) {
        return Err(ValidationError::ZeroConcurrency);
    }

    if workflow.pattern == Pattern::Custom {
        if let Some(node) = find_cycle(workflow) {
            return Err(ValidationError::Cycle(node));
        }
    }

    Ok(())
}

/// Kahn's algorithm: returns a node on a cycle, in declaration order, if the
/// edge set is not acyclic.
fn find_cycle(workflow: &WorkflowDefinition) -> Option<String> {
    let mut in_degree: HashMap<&str, usize> =
        workflow.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for edge in &workflow.edges {
        *in_degree.entry(edge.to.as_str()).or_default() += 1;
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut removed = 0;

    while let Some(id) = ready.pop_front() {
        removed += 1;
        for edge in workflow.outgoing(id) {
            if let Some(d) = in_degree.get_mut(edge.to.as_str()) {
                *d -= 1;
                if *d == 0 {
                    ready.push_back(edge.to.as_str());
                }
            }
        }
    }

    if removed == in_degree.len() {
        return None;
    }
    workflow
        .nodes
        .iter()
        .find(|n| in_degree.get(n.id.as_str()).is_some_and(|d| *d > 0))
        .map(|n| n.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::graph::{AgentEdge, AgentNode, WorkflowConfig};
    use maestro_test_utils::fixtures;

    #[test]
    fn test_fixtures_are_valid() {
        for wf in [
            fixtures::content_pipeline(),
            fixtures::analyst_fanout(Some(4)),
            fixtures::supervised_team(),
            fixtures::support_network(),
            fixtures::referral_desk(),
            fixtures::diamond_dag(),
        ] {
            assert_eq!(validate_workflow(&wf), Ok(()), "{}", wf.id);
        }
    }

    #[test]
    fn test_missing_fields() {
        let mut wf = fixtures::content_pipeline();
        wf.name = " ".into();
        assert_eq!(validate_workflow(&wf), Err(ValidationError::MissingField("name")));

        let mut wf = fixtures::content_pipeline();
        wf.id.clear();
        assert_eq!(validate_workflow(&wf), Err(ValidationError::MissingField("id")));

        let mut wf = fixtures::content_pipeline();
        wf.entry_point.clear();
        assert_eq!(
            validate_workflow(&wf),
            Err(ValidationError::MissingField("entryPoint"))
        );
    }

    #[test]
    fn test_empty_nodes() {
        let wf = WorkflowDefinition::new("wf", "Empty", Pattern::Sequential).with_entry_point("a");
        assert_eq!(validate_workflow(&wf), Err(ValidationError::EmptyNodes));
    }

    #[test]
    fn test_unknown_entry_and_exit() {
        let wf = fixtures::content_pipeline().with_entry_point("ghost");
        assert_eq!(
            validate_workflow(&wf),
            Err(ValidationError::UnknownEntryPoint("ghost".into()))
        );

        let wf = fixtures::content_pipeline().with_exit_points(vec!["ghost".into()]);
        assert_eq!(
            validate_workflow(&wf),
            Err(ValidationError::UnknownExitPoint("ghost".into()))
        );
    }

    #[test]
    fn test_duplicate_node() {
        let wf = fixtures::content_pipeline().with_node(AgentNode::new("seo", "SEO again"));
        assert_eq!(
            validate_workflow(&wf),
            Err(ValidationError::DuplicateNode("seo".into()))
        );
    }

    #[test]
    fn test_dangling_edge() {
        let wf = fixtures::content_pipeline().with_edge(AgentEdge::new("publisher", "archive"));
        assert_eq!(
            validate_workflow(&wf),
            Err(ValidationError::DanglingEdge {
                from: "publisher".into(),
                to: "archive".into(),
                missing: "archive".into(),
            })
        );
    }

    #[test]
    fn test_zero_concurrency() {
        let wf = fixtures::analyst_fanout(Some(0));
        assert_eq!(validate_workflow(&wf), Err(ValidationError::ZeroConcurrency));
    }

    #[test]
    fn test_cycles_rejected_only_for_custom() {
        let cyclic = fixtures::diamond_dag().with_edge(AgentEdge::new("report", "fetch"));
        assert_eq!(
            validate_workflow(&cyclic),
            Err(ValidationError::Cycle("fetch".into()))
        );

        let mut looping_pipeline = cyclic.clone();
        looping_pipeline.pattern = Pattern::Sequential;
        assert_eq!(validate_workflow(&looping_pipeline), Ok(()));
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let wf = WorkflowDefinition::new("self", "Self", Pattern::Custom)
            .with_node(AgentNode::new("a", "A"))
            .with_edge(AgentEdge::new("a", "a"))
            .with_entry_point("a")
            .with_config(WorkflowConfig::default());
        assert_eq!(validate_workflow(&wf), Err(ValidationError::Cycle("a".into())));
    }
}
