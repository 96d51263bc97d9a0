use futures::future::BoxFuture;
use serde_json::{json, Value};

use maestro_core::error::Result;
use maestro_core::graph::AgentNode;
use maestro_core::traits::NodeExecutor;
use maestro_core::types::NodeOutput;
use maestro_core::ExecutionContext;

/// Offline executor that answers every node with its own description.
///
/// Used by the CLI to dry-run a workflow without any model behind it. Token
/// usage is estimated at four characters per token of input.
#[derive(Debug, Clone, Default)]
pub struct EchoExecutor;

fn estimate_tokens(value: &Value) -> u64 {
    let chars = match value {
        Value::String(s) => s.len(),
        other => other.to_string().len(),
    };
    (chars as u64).div_ceil(4)
}

impl NodeExecutor for EchoExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a AgentNode,
        input: Value,
        _ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let tokens = estimate_tokens(&input);
            let mut output = json!({
                "node": node.id,
                "agent": node.name,
                "type": node.node_type,
                "input": input,
            });
            if let Some(model) = &node.model {
                output["model"] = json!(model);
            }
            Ok(NodeOutput::new(output).with_usage(tokens, 0.0))
        })
    }
}
