use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use maestro_core::config::AppConfig;
use maestro_core::graph::WorkflowDefinition;
use maestro_core::types::new_execution_id;

use maestro_engine::{
    open_store, validate_workflow, EchoExecutor, ExecuteOptions, Orchestrator, RunLogger,
};

#[derive(Parser)]
#[command(
    name = "maestro",
    version,
    about = "Multi-pattern workflow orchestration engine"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow definition file without running it
    Validate {
        /// Workflow file (.json or .toml)
        file: PathBuf,
    },
    /// Store a workflow definition in the configured store
    Register {
        /// Workflow file (.json or .toml)
        file: PathBuf,
    },
    /// Dry-run a workflow with the echo executor
    Run {
        /// Workflow file, or the id of a registered workflow
        workflow: String,
        /// Workflow input as JSON
        #[arg(short, long, default_value = "null")]
        input: String,
        /// Execution id (auto-generated if not provided)
        #[arg(long)]
        execution_id: Option<String>,
        /// Run log verbosity: 1=summary, 2=per-node results, 3=everything
        #[arg(long, default_value_t = 2)]
        log_level: u8,
    },
    /// List registered workflows
    List,
    /// Print a registered workflow definition
    Show {
        /// Workflow id
        id: String,
    },
    /// Print a persisted execution result
    Execution {
        /// Execution id
        id: String,
    },
    /// Delete a registered workflow
    Delete {
        /// Workflow id
        id: String,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Completions don't need config or logging
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "maestro", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        AppConfig::default()
    };

    let default_filter = config.log.filter.as_deref().unwrap_or("maestro=info,warn");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Validate { file } => {
            let workflow = WorkflowDefinition::load(&file)?;
            validate_workflow(&workflow)?;
            println!(
                "{}: {} workflow with {} nodes and {} edges is valid",
                workflow.id,
                workflow.pattern,
                workflow.nodes.len(),
                workflow.edges.len()
            );
        }
        Commands::Register { file } => {
            let orchestrator = build_orchestrator(&config)?;
            let workflow = orchestrator.register_workflow(WorkflowDefinition::load(&file)?)?;
            println!("Registered {}", workflow.id);
        }
        Commands::Run {
            workflow,
            input,
            execution_id,
            log_level,
        } => {
            let input: serde_json::Value = serde_json::from_str(&input)
                .map_err(|e| anyhow::anyhow!("--input is not valid JSON: {}", e))?;
            let orchestrator = build_orchestrator(&config)?;
            let workflow_id = resolve_workflow(&orchestrator, &workflow)?;
            let execution_id = execution_id.unwrap_or_else(new_execution_id);

            let cancel = CancellationToken::new();
            let logger = config.log.run_log_path().map(|dir| {
                let logger = RunLogger::new(dir, log_level);
                info!(path = %logger.log_path(&execution_id).display(), "Writing run log");
                logger.spawn(&orchestrator.events(), execution_id.clone(), cancel.clone())
            });

            let options = ExecuteOptions::with_execution_id(&execution_id);
            let result = tokio::select! {
                result = orchestrator.execute(&workflow_id, input, options) => result,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    anyhow::bail!("Interrupted before execution {} finished", execution_id);
                }
            };

            // The logger stops on ExecutionFinished; an early error never publishes one.
            if result.is_err() {
                cancel.cancel();
            }
            if let Some(handle) = logger {
                handle.await.ok();
            }

            let result = result?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::List => {
            let store = open_store(&config.store)?;
            let workflows = store.list_workflows()?;
            if workflows.is_empty() {
                println!("No workflows registered.");
            }
            for wf in workflows {
                println!(
                    "{:<24} {:<18} {:>3} nodes  {}",
                    wf.id,
                    wf.pattern,
                    wf.nodes.len(),
                    wf.name
                );
            }
        }
        Commands::Show { id } => {
            let store = open_store(&config.store)?;
            match store.get_workflow(&id)? {
                Some(wf) => println!("{}", serde_json::to_string_pretty(&wf)?),
                None => anyhow::bail!("Workflow not found: {}", id),
            }
        }
        Commands::Execution { id } => {
            let store = open_store(&config.store)?;
            match store.get_execution(&id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record.result)?),
                None => anyhow::bail!("Execution not found: {}", id),
            }
        }
        Commands::Delete { id } => {
            let store = open_store(&config.store)?;
            if store.delete_workflow(&id)? {
                println!("Deleted {}", id);
            } else {
                anyhow::bail!("Workflow not found: {}", id);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::builder(Arc::new(EchoExecutor))
        .with_config(config.clone())
        .build()?;
    Ok(orchestrator)
}

/// Register the workflow file at `arg`, or treat `arg` as an already registered id.
fn resolve_workflow(orchestrator: &Orchestrator, arg: &str) -> anyhow::Result<String> {
    let path = Path::new(arg);
    if !path.exists() {
        return Ok(arg.to_string());
    }

    let workflow = WorkflowDefinition::load(path)?;
    match orchestrator.get_workflow(&workflow.id)? {
        Some(stored) if stored == workflow => {
            info!(workflow_id = %workflow.id, "Using registered workflow");
        }
        Some(_) => anyhow::bail!(
            "A different workflow is already registered as {}; delete it first",
            workflow.id
        ),
        None => {
            if let Err(e) = orchestrator.register_workflow(workflow.clone()) {
                warn!(file = %path.display(), "Workflow file failed validation");
                return Err(e.into());
            }
        }
    }
    Ok(workflow.id)
}
