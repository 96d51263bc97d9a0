use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, Receiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use maestro_core::event::{EventBus, WorkflowEvent};

/// JSONL execution logger.
///
/// Subscribes to the EventBus and writes one JSON object per line for a
/// single execution. Lines are flushed as they are written, so a crash
/// mid-run leaves every earlier line intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    execution_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// Logs go to `{log_dir}/{execution_id}.jsonl`.
    /// `level` controls verbosity: 1=summary, 2=per-node results, 3=everything.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    pub fn log_path(&self, execution_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", execution_id))
    }

    /// Subscribe to `event_bus` and run the logger on a new task.
    ///
    /// The subscription is taken before this returns, so every event
    /// published afterwards reaches the log even if the task has not been
    /// polled yet.
    pub fn spawn(
        self,
        event_bus: &EventBus,
        execution_id: String,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, execution_id, cancel))
    }

    /// Write JSONL from `rx` until cancellation or `ExecutionFinished` for this execution.
    pub async fn run(
        self,
        mut rx: Receiver<WorkflowEvent>,
        execution_id: String,
        cancel: CancellationToken,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let log_path = self.log_path(&execution_id);
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.execution_id() != execution_id {
                                continue;
                            }
                            let finished = matches!(event, WorkflowEvent::ExecutionFinished { .. });

                            if let Some(entry) = self.event_to_entry(&event) {
                                if let Ok(json) = serde_json::to_string(&entry) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write log entry");
                                        break;
                                    }
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush log");
                                    }
                                }
                            }

                            if finished {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert an event to a log entry (None if filtered by level).
    fn event_to_entry(&self, event: &WorkflowEvent) -> Option<LogEntry> {
        let entry = |node_id: Option<&String>, detail: Option<serde_json::Value>| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            execution_id: event.execution_id().to_string(),
            event_type: event.kind(),
            node_id: node_id.cloned(),
            detail,
        };

        match event {
            // L1: run summary
            WorkflowEvent::ExecutionStarted {
                workflow_id,
                pattern,
                ..
            } => Some(entry(
                None,
                Some(serde_json::json!({ "workflow_id": workflow_id, "pattern": pattern })),
            )),
            WorkflowEvent::ExecutionFinished { status, output, .. } => Some(entry(
                None,
                Some(serde_json::json!({ "status": status, "output": output })),
            )),
            WorkflowEvent::ApprovalRequired { decision, .. } => Some(entry(
                decision.next_node.as_ref(),
                Some(serde_json::json!({ "reasoning": decision.reasoning })),
            )),

            // L2: per-node results
            WorkflowEvent::NodeFinished {
                node_id,
                status,
                elapsed_ms,
                ..
            } if self.level >= 2 => Some(entry(
                Some(node_id),
                Some(serde_json::json!({ "status": status, "elapsed_ms": elapsed_ms })),
            )),
            WorkflowEvent::BatchStarted { batch, size, .. } if self.level >= 2 => Some(entry(
                None,
                Some(serde_json::json!({ "batch": batch, "size": size })),
            )),

            // L3: everything else
            WorkflowEvent::NodeStarted { node_id, .. } if self.level >= 3 => {
                Some(entry(Some(node_id), None))
            }

            _ => None,
        }
    }
}
