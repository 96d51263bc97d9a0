pub mod executor;
pub mod orchestrator;
pub mod patterns;
pub mod policy;
pub mod registry;
pub mod run_log;
pub mod runner;
pub mod store;
pub mod validate;

pub use executor::EchoExecutor;
pub use orchestrator::{ExecuteOptions, Orchestrator, OrchestratorBuilder};
pub use patterns::{ExecutionEnv, PatternExecutor, PatternOutcome, PatternTable};
pub use policy::{ApprovalGate, EdgeReferral, FirstCandidate, FirstUnvisited, Policies};
pub use registry::WorkflowRegistry;
pub use run_log::RunLogger;
pub use runner::{NodeRun, NodeRunner, RunnerSettings};
pub use store::{open_store, InMemoryStore, SqliteStore};
pub use validate::validate_workflow;
