use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};

use maestro_core::error::{MaestroError, ValidationError};
use maestro_core::graph::{AgentEdge, Pattern, WorkflowConfig, WorkflowDefinition};
use maestro_core::types::{Decision, ExecutionResult, ExecutionStatus};
use maestro_core::WorkflowEvent;
use maestro_engine::{ExecuteOptions, Orchestrator, Policies, RunLogger, SqliteStore};
use maestro_test_utils::{fixtures, MockExecutor, ScriptedPolicy};

fn orchestrator(mock: MockExecutor) -> Orchestrator {
    Orchestrator::new(Arc::new(mock))
}

async fn run(orch: &Orchestrator, workflow: WorkflowDefinition, input: Value) -> ExecutionResult {
    let id = workflow.id.clone();
    orch.register_workflow(workflow).expect("register workflow");
    orch.execute(&id, input, ExecuteOptions::default())
        .await
        .expect("execute workflow")
}

fn node_ids(result: &ExecutionResult) -> Vec<&str> {
    result.history.iter().map(|e| e.node_id.as_str()).collect()
}

#[tokio::test]
async fn test_sequential_pipeline_scenario() {
    let orch = orchestrator(MockExecutor::new());
    let result = run(&orch, fixtures::content_pipeline(), json!({"topic": "AI trends"})).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(
        node_ids(&result),
        vec!["research", "writer", "editor", "seo", "publisher"]
    );
    assert_eq!(result.output["node"], "publisher");
    // Each node receives its predecessor's output.
    assert_eq!(result.history[0].input, json!({"topic": "AI trends"}));
    assert_eq!(result.history[1].input["node"], "research");
}

#[tokio::test]
async fn test_concurrent_batching_scenario() {
    let mock = MockExecutor::new()
        .with_delay("market", 60)
        .with_delay("legal", 5);
    let orch = orchestrator(mock);
    let mut events = orch.events().subscribe();

    let result = run(&orch, fixtures::analyst_fanout(Some(4)), json!("quarterly brief")).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    let results = result.output["results"].as_array().expect("results array");
    let order: Vec<&str> = results.iter().filter_map(|r| r["nodeId"].as_str()).collect();
    assert_eq!(order, vec!["market", "legal", "finance", "tech", "risk"]);
    assert_eq!(result.output["summary"], "5 of 5 agents completed in 2 batch(es)");

    let mut batch_sizes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let WorkflowEvent::BatchStarted { size, .. } = event {
            batch_sizes.push(size);
        }
    }
    assert_eq!(batch_sizes, vec![4, 1]);
}

#[tokio::test]
async fn test_supervisor_scenario() {
    let orch = orchestrator(MockExecutor::new());
    let result = run(&orch, fixtures::supervised_team(), json!("build a feature")).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(
        node_ids(&result),
        vec!["researcher", "coder", "reviewer", "writer"]
    );
    assert_eq!(result.output["node"], "writer");
}

#[tokio::test]
async fn test_invalid_entry_point_scenario() {
    let orch = orchestrator(MockExecutor::new());
    orch.register_workflow(fixtures::diamond_dag()).expect("register diamond");
    let before = orch.list_workflows().expect("list before");

    let err = orch
        .register_workflow(fixtures::content_pipeline().with_entry_point("ghost"))
        .unwrap_err();

    assert!(matches!(
        err,
        MaestroError::Validation(ValidationError::UnknownEntryPoint(_))
    ));
    assert_eq!(orch.list_workflows().expect("list after"), before);
}

#[tokio::test]
async fn test_supervisor_never_exceeds_ten_invocations() {
    let script = (0..25).map(|_| Decision::goto("reviewer", "once more")).collect();
    let policies = Policies::default().with_supervisor(Arc::new(ScriptedPolicy::new(script)));
    let orch = Orchestrator::builder(Arc::new(MockExecutor::new()))
        .with_policies(policies)
        .with_store(Arc::new(SqliteStore::in_memory().expect("sqlite store")))
        .build()
        .expect("build orchestrator");

    let result = run(&orch, fixtures::supervised_team(), Value::Null).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.history.len(), 10);
    assert_eq!(result.metrics.nodes_executed, 10);
}

#[tokio::test]
async fn test_adaptive_network_follows_conditions() {
    let mock = MockExecutor::new().with_output("triage", json!({"category": "tech"}));
    let orch = orchestrator(mock);

    let result = run(&orch, fixtures::support_network(), json!("my laptop is on fire")).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(node_ids(&result), vec!["triage", "tech", "close"]);
    assert_eq!(
        result.history[0].decision.as_ref().and_then(|d| d.next_node.as_deref()),
        Some("tech")
    );
}

#[tokio::test]
async fn test_adaptive_network_hop_bound() {
    // A complete graph: every node may hand to every other.
    let ids = ["n1", "n2", "n3", "n4"];
    let mut wf = WorkflowDefinition::new("mesh", "Mesh", Pattern::AdaptiveNetwork)
        .with_nodes(ids.map(|id| maestro_core::AgentNode::new(id, id)))
        .with_entry_point("n1");
    for from in ids {
        for to in ids {
            if from != to {
                wf = wf.with_edge(AgentEdge::new(from, to));
            }
        }
    }
    let orch = orchestrator(MockExecutor::new());

    let result = run(&orch, wf, Value::Null).await;

    let visited = node_ids(&result);
    assert!(visited.len() <= 2 * ids.len());
    let unique: HashSet<&str> = visited.iter().copied().collect();
    assert_eq!(unique.len(), visited.len());
    assert_eq!(visited.len(), 4);
}

#[tokio::test]
async fn test_handoff_chain_is_bounded_and_unique() {
    let ids: Vec<String> = (1..=8).map(|i| format!("agent{}", i)).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let wf = WorkflowDefinition::new("long-referral", "Long Referral", Pattern::Handoff)
        .with_nodes(refs.iter().map(|id| maestro_core::AgentNode::new(*id, *id)))
        .with_chain(&refs)
        .with_entry_point("agent1");
    let orch = orchestrator(MockExecutor::new());

    let result = run(&orch, wf, json!("case #42")).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(
        node_ids(&result),
        vec!["agent1", "agent2", "agent3", "agent4", "agent5"]
    );
    assert_eq!(result.output["node"], "agent5");
}

#[tokio::test]
async fn test_handoff_referral_desk() {
    let orch = orchestrator(MockExecutor::new());
    let result = run(&orch, fixtures::referral_desk(), json!("refund request")).await;

    assert_eq!(node_ids(&result), vec!["frontdesk", "specialist", "escalation"]);
    assert!(result.history[2].decision.is_none());
}

#[tokio::test]
async fn test_custom_dag_completeness() {
    let wf = fixtures::diamond_dag().with_exit_points(vec!["report".into(), "summarize".into()]);
    let mock = MockExecutor::new()
        .with_output("report", json!("final report"))
        .with_output("summarize", json!("short summary"));
    let orch = orchestrator(mock);

    let result = run(&orch, wf, json!({"url": "https://example.com"})).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    let mut executed = node_ids(&result);
    executed.sort_unstable();
    assert_eq!(executed, vec!["classify", "fetch", "report", "summarize"]);
    assert_eq!(result.output, json!(["final report", "short summary"]));
}

#[tokio::test]
async fn test_custom_dag_single_exit_is_not_wrapped() {
    let mock = MockExecutor::new().with_output("report", json!({"pages": 3}));
    let orch = orchestrator(mock);

    let result = run(&orch, fixtures::diamond_dag(), Value::Null).await;

    assert_eq!(result.output, json!({"pages": 3}));
}

#[tokio::test]
async fn test_registration_atomicity() {
    let orch = orchestrator(MockExecutor::new());
    orch.register_workflow(fixtures::content_pipeline()).expect("register pipeline");
    let before = orch.list_workflows().expect("list before");

    let dangling = fixtures::support_network().with_edge(AgentEdge::new("close", "void"));
    let no_entry = fixtures::referral_desk().with_entry_point("");
    let mut empty = fixtures::diamond_dag();
    empty.nodes.clear();
    let cyclic = fixtures::diamond_dag().with_edge(AgentEdge::new("report", "fetch"));

    for wf in [dangling, no_entry, empty, cyclic] {
        let id = wf.id.clone();
        let err = orch.register_workflow(wf).unwrap_err();
        assert!(matches!(err, MaestroError::Validation(_)), "{} was accepted", id);
        assert!(orch.get_workflow(&id).expect("lookup").is_none());
    }

    assert_eq!(orch.list_workflows().expect("list after"), before);
}

#[tokio::test]
async fn test_failed_run_still_returns_result() {
    let mock = MockExecutor::new().failing("editor", "style guide missing");
    let orch = orchestrator(mock);
    let wf = fixtures::content_pipeline().with_config(WorkflowConfig {
        error_handling: maestro_core::ErrorHandling::FailFast,
        ..Default::default()
    });

    let result = run(&orch, wf, json!("draft")).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(node_ids(&result), vec!["research", "writer", "editor"]);
    assert_eq!(result.output["node"], "writer");
    assert!(result.error.as_deref().unwrap_or_default().contains("style guide missing"));
    assert_eq!(result.metrics.nodes_executed, 3);
}

#[tokio::test]
async fn test_results_survive_in_sqlite_store() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("maestro.db");
    let wf = fixtures::referral_desk().with_config(WorkflowConfig {
        checkpoint_enabled: true,
        ..Default::default()
    });

    let execution_id = {
        let store = Arc::new(SqliteStore::open(&path).expect("open store"));
        let orch = Orchestrator::builder(Arc::new(MockExecutor::new()))
            .with_store(store)
            .build()
            .expect("build orchestrator");
        run(&orch, wf, json!("ticket")).await.execution_id
    };

    let store = Arc::new(SqliteStore::open(&path).expect("reopen store"));
    let orch = Orchestrator::builder(Arc::new(MockExecutor::new()))
        .with_store(store)
        .build()
        .expect("build orchestrator");

    assert!(orch.get_workflow("referral-desk").expect("lookup").is_some());
    let restored = orch
        .get_result(&execution_id)
        .expect("lookup result")
        .expect("result persisted");
    assert_eq!(restored.status, ExecutionStatus::Completed);
    assert_eq!(restored.history.len(), 3);
}

#[tokio::test]
async fn test_run_log_written_for_execution() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let orch = orchestrator(MockExecutor::new());
    orch.register_workflow(fixtures::content_pipeline()).expect("register pipeline");

    let logger = RunLogger::new(dir.path().to_path_buf(), 2);
    let path = logger.log_path("logged-run");
    let handle = logger.spawn(
        &orch.events(),
        "logged-run".into(),
        tokio_util::sync::CancellationToken::new(),
    );

    // No yield between spawning and executing: the logger task may not have
    // been polled before the whole run is published.
    orch.execute(
        "content-pipeline",
        json!("topic"),
        ExecuteOptions::with_execution_id("logged-run"),
    )
    .await
    .expect("execute workflow");
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("logger stops on execution_finished")
        .expect("logger task");

    let content = std::fs::read_to_string(path).expect("read run log");
    let lines: Vec<Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.first().map(|l| l["event_type"].clone()), Some(json!("execution_started")));
    assert_eq!(lines.last().map(|l| l["event_type"].clone()), Some(json!("execution_finished")));
    let finished_nodes = lines.iter().filter(|l| l["event_type"] == "node_finished").count();
    assert_eq!(finished_nodes, 5);
}

#[test]
fn test_definition_and_result_json_roundtrip() {
    let wf = fixtures::support_network();
    let json = serde_json::to_string(&wf).expect("serialize definition");
    let parsed: WorkflowDefinition = serde_json::from_str(&json).expect("parse definition");
    assert_eq!(parsed, wf);
    assert!(json.contains("\"entryPoint\":\"triage\""));
}
