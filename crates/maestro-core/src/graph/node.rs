use serde::{Deserialize, Serialize};

/// A node in the workflow graph.
///
/// Each node is one unit of work (an agent, model, or tool call) handed to
/// the external `NodeExecutor`. The engine itself only reads `id`, `name`,
/// `timeout_ms` and `max_retries`; everything else is passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentNode {
    /// Unique identifier within the workflow.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Free-form node kind (e.g. "agent", "tool", "llm").
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    /// Capability tags used by routing policies.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Model override for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt or instructions for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Tool names available to this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// Deadline for a single attempt. Falls back to the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Extra attempts allowed when the workflow runs in retry mode.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_node_type() -> String {
    "agent".to_string()
}

impl AgentNode {
    /// Create a new node with minimal configuration.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type: default_node_type(),
            capabilities: vec![],
            model: None,
            prompt: None,
            tools: vec![],
            timeout_ms: None,
            max_retries: 0,
        }
    }

    /// Set the node type.
    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }

    /// Set the capability tags.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the tools.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the per-attempt deadline.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Whether the node advertises a capability (case-insensitive).
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(capability))
    }
}
