use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::edge::AgentEdge;
use super::node::AgentNode;
use crate::error::{MaestroError, Result};

/// Traversal strategy applied to a workflow graph.
///
/// Deserialization goes through [`FromStr`], so files, the CLI and the
/// store accept the same names and aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Pattern {
    /// Pipeline: follow single outgoing edges from the entry point.
    Sequential,
    /// Fan-out/fan-in over all nodes in bounded batches.
    Concurrent,
    /// A supervisor node delegates to specialists one at a time.
    Supervisor,
    /// Decentralized hops chosen per step from matching edges.
    AdaptiveNetwork,
    /// Referral chain where each node names its successor.
    Handoff,
    /// Dataflow DAG over the edge set.
    Custom,
}

impl Pattern {
    pub const ALL: [Pattern; 6] = [
        Pattern::Sequential,
        Pattern::Concurrent,
        Pattern::Supervisor,
        Pattern::AdaptiveNetwork,
        Pattern::Handoff,
        Pattern::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
            Self::Supervisor => "supervisor",
            Self::AdaptiveNetwork => "adaptive_network",
            Self::Handoff => "handoff",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = MaestroError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "pipeline" => Ok(Self::Sequential),
            "concurrent" | "parallel" => Ok(Self::Concurrent),
            "supervisor" | "hierarchical" => Ok(Self::Supervisor),
            "adaptive_network" | "adaptive-network" | "decentralized" => {
                Ok(Self::AdaptiveNetwork)
            }
            "handoff" | "referral" => Ok(Self::Handoff),
            "custom" | "dag" => Ok(Self::Custom),
            other => Err(MaestroError::UnsupportedPattern(other.to_string())),
        }
    }
}

impl TryFrom<String> for Pattern {
    type Error = MaestroError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// What happens when a node fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Abort the run on the first node failure.
    FailFast,
    /// Record the failure and keep going.
    #[default]
    Continue,
    /// Retry the node with backoff, then behave like `Continue`.
    Retry,
}

/// Human approval gating for supervisor decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanInTheLoop {
    #[serde(default)]
    pub enabled: bool,
    /// Node ids whose selection may require approval.
    #[serde(default)]
    pub approval_points: Vec<String>,
    /// Named numeric thresholds available to decision policies.
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

/// Per-workflow execution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Batch size for the concurrent pattern. `None` runs all nodes at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Deadline for the whole run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    /// Persist the execution record to the workflow store when the run ends.
    #[serde(default)]
    pub checkpoint_enabled: bool,
    #[serde(default)]
    pub human_in_the_loop: HumanInTheLoop,
}

/// A registered, reusable workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub pattern: Pattern,
    #[serde(default)]
    pub nodes: Vec<AgentNode>,
    #[serde(default)]
    pub edges: Vec<AgentEdge>,
    #[serde(default)]
    pub entry_point: String,
    #[serde(default)]
    pub exit_points: Vec<String>,
    #[serde(default)]
    pub config: WorkflowConfig,
}

impl WorkflowDefinition {
    /// Create an empty definition; nodes, edges and entry point are added with the builders.
    pub fn new(id: impl Into<String>, name: impl Into<String>, pattern: Pattern) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            pattern,
            nodes: vec![],
            edges: vec![],
            entry_point: String::new(),
            exit_points: vec![],
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_node(mut self, node: AgentNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = AgentNode>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn with_edge(mut self, edge: AgentEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Chain `ids` with unconditional edges, in order.
    pub fn with_chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.edges.push(AgentEdge::new(pair[0], pair[1]));
        }
        self
    }

    pub fn with_entry_point(mut self, id: impl Into<String>) -> Self {
        self.entry_point = id.into();
        self
    }

    pub fn with_exit_points(mut self, ids: Vec<String>) -> Self {
        self.exit_points = ids;
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&AgentNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn is_exit_point(&self, id: &str) -> bool {
        self.exit_points.iter().any(|e| e == id)
    }

    /// Edges leaving `id`, in declaration order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a AgentEdge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Edges arriving at `id`, in declaration order.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a AgentEdge> + 'a {
        self.edges.iter().filter(move |e| e.to == id)
    }

    /// Read a definition from a `.toml` file, or JSON for any other extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }

    /// Parse a JSON definition. An unknown `pattern` is reported as
    /// `UnsupportedPattern` rather than a JSON error.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(content)?;
        check_pattern(raw.get("pattern").and_then(|p| p.as_str()))?;
        Ok(serde_json::from_value(raw)?)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: toml::Value =
            toml::from_str(content).map_err(|e| MaestroError::Config(e.to_string()))?;
        check_pattern(raw.get("pattern").and_then(|p| p.as_str()))?;
        raw.try_into()
            .map_err(|e: toml::de::Error| MaestroError::Config(e.to_string()))
    }
}

fn check_pattern(raw: Option<&str>) -> Result<()> {
    match raw {
        Some(name) => name.parse::<Pattern>().map(|_| ()),
        None => Ok(()),
    }
}
