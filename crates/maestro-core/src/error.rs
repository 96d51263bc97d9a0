use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaestroError {
    // Registration errors
    #[error("Invalid workflow definition: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unsupported orchestration pattern: {0}")]
    UnsupportedPattern(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    // Execution errors
    #[error("Node execution failed: {node_id}: {message}")]
    NodeExecution { node_id: String, message: String },

    #[error("{scope} timed out after {timeout_ms}ms")]
    Timeout { scope: String, timeout_ms: u64 },

    #[error("Decision policy {policy} chose ineligible node: {node_id}")]
    InvalidDecision { policy: String, node_id: String },

    #[error("Execution already exists: {0}")]
    DuplicateExecution(String),

    // Storage errors
    #[error("Store error: {0}")]
    Store(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MaestroError {
    /// Shorthand for a failed node.
    pub fn node(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Structural problems found while registering a workflow definition.
///
/// Only the first violated invariant is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("workflow has no nodes")]
    EmptyNodes,

    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),

    #[error("entry point `{0}` is not a node of the workflow")]
    UnknownEntryPoint(String),

    #[error("exit point `{0}` is not a node of the workflow")]
    UnknownExitPoint(String),

    #[error("edge {from} -> {to} references unknown node `{missing}`")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    #[error("maxConcurrency must be at least 1")]
    ZeroConcurrency,

    #[error("custom workflow contains a cycle through `{0}`")]
    Cycle(String),

    #[error("workflow `{0}` is already registered")]
    AlreadyRegistered(String),
}

pub type Result<T> = std::result::Result<T, MaestroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_converts() {
        let err: MaestroError = ValidationError::EmptyNodes.into();
        assert!(matches!(err, MaestroError::Validation(ValidationError::EmptyNodes)));
        assert_eq!(err.to_string(), "Invalid workflow definition: workflow has no nodes");
    }

    #[test]
    fn test_timeout_display() {
        let err = MaestroError::Timeout {
            scope: "node writer".into(),
            timeout_ms: 250,
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "node writer timed out after 250ms");
        assert!(!MaestroError::node("a", "boom").is_timeout());
    }
}
