use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A directed edge between two nodes of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEdge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Predicate over the source node's output. `None` means always.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
    /// Wrap the carried value as `{ "from": <source>, "output": <value> }`.
    #[serde(default)]
    pub transform_output: bool,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Traverse only if the source node succeeded.
    OnSuccess,
    /// Traverse only if the source node failed.
    OnFailure,
    /// Traverse if a simple expression matches the source output.
    /// Supported: `key == "value"`, `key != "value"`, `key contains "substr"`,
    /// `exists key`.
    Conditional { expr: String },
}

impl AgentEdge {
    /// Create an unconditional edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
            transform_output: false,
        }
    }

    /// Create an edge that fires on success.
    pub fn on_success(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to).with_condition(EdgeCondition::OnSuccess)
    }

    /// Create an edge that fires on failure.
    pub fn on_failure(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to).with_condition(EdgeCondition::OnFailure)
    }

    /// Create a conditional edge.
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        Self::new(from, to).with_condition(EdgeCondition::Conditional { expr: expr.into() })
    }

    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn transforming(mut self) -> Self {
        self.transform_output = true;
        self
    }

    /// Whether this edge may be traversed given the source node's result.
    pub fn admits(&self, output: &Value, succeeded: bool) -> bool {
        match &self.condition {
            None => true,
            Some(EdgeCondition::OnSuccess) => succeeded,
            Some(EdgeCondition::OnFailure) => !succeeded,
            Some(EdgeCondition::Conditional { expr }) => evaluate_condition(expr, output),
        }
    }

    /// The value delivered to the target node when `output` flows along this edge.
    pub fn carry(&self, output: Value) -> Value {
        if self.transform_output {
            serde_json::json!({ "from": self.from, "output": output })
        } else {
            output
        }
    }
}

/// Evaluate a simple conditional expression against a node output.
///
/// `key` is a dotted path into the output object (`review.verdict`); the
/// special key `output` addresses the whole output rendered as text.
///
/// Supported expressions:
/// - `exists key`: the path resolves to a non-null value
/// - `key == "value"`: exact match
/// - `key != "value"`: not equal (a missing key never matches)
/// - `key contains "substr"`: substring match
///
/// Returns `false` for unparseable expressions.
pub fn evaluate_condition(expr: &str, output: &Value) -> bool {
    let expr = expr.trim();

    if let Some(key) = expr.strip_prefix("exists ") {
        return resolve(output, key.trim()).is_some();
    }

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, " contains ") {
        return resolve(output, key).is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return resolve(output, key).is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(expr, "==") {
        return resolve(output, key).is_some_and(|s| s == value);
    }

    false
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, val) = expr.split_once(op)?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, val.trim().trim_matches('"')))
}

/// Resolve a dotted path to its textual form.
fn resolve(output: &Value, key: &str) -> Option<String> {
    let value = if key == "output" {
        output
    } else {
        let pointer = format!("/{}", key.replace('.', "/"));
        output.pointer(&pointer)?
    };

    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_builders() {
        let e = AgentEdge::new("a", "b");
        assert_eq!(e.from, "a");
        assert_eq!(e.to, "b");
        assert!(e.condition.is_none());

        let e = AgentEdge::on_success("a", "c");
        assert_eq!(e.condition, Some(EdgeCondition::OnSuccess));

        let e = AgentEdge::on_failure("a", "d");
        assert_eq!(e.condition, Some(EdgeCondition::OnFailure));
    }

    #[test]
    fn test_admits_by_status() {
        let out = json!(null);
        assert!(AgentEdge::new("a", "b").admits(&out, false));
        assert!(AgentEdge::on_success("a", "b").admits(&out, true));
        assert!(!AgentEdge::on_success("a", "b").admits(&out, false));
        assert!(AgentEdge::on_failure("a", "b").admits(&out, false));
    }

    #[test]
    fn test_condition_equals() {
        let out = json!({"status": "success"});
        assert!(evaluate_condition(r#"status == "success""#, &out));
        assert!(!evaluate_condition(r#"status == "failure""#, &out));
    }

    #[test]
    fn test_condition_not_equals() {
        let out = json!({"status": "success"});
        assert!(evaluate_condition(r#"status != "failure""#, &out));
        assert!(!evaluate_condition(r#"status != "success""#, &out));
        assert!(!evaluate_condition(r#"missing != "x""#, &out));
    }

    #[test]
    fn test_condition_contains_whole_output() {
        let out = json!("The file was created successfully.");
        assert!(evaluate_condition(r#"output contains "created""#, &out));
        assert!(!evaluate_condition(r#"output contains "deleted""#, &out));
    }

    #[test]
    fn test_condition_nested_path_and_numbers() {
        let out = json!({"review": {"verdict": "approve", "score": 9}});
        assert!(evaluate_condition(r#"review.verdict == "approve""#, &out));
        assert!(evaluate_condition(r#"review.score == "9""#, &out));
        assert!(evaluate_condition("exists review.score", &out));
        assert!(!evaluate_condition("exists review.author", &out));
    }

    #[test]
    fn test_condition_invalid_expr() {
        assert!(!evaluate_condition("this is not valid", &json!({})));
        assert!(!evaluate_condition(r#"== "x""#, &json!({})));
    }

    #[test]
    fn test_carry_transform() {
        let plain = AgentEdge::new("a", "b");
        assert_eq!(plain.carry(json!(1)), json!(1));

        let wrapped = AgentEdge::new("a", "b").transforming();
        assert_eq!(wrapped.carry(json!(1)), json!({"from": "a", "output": 1}));
    }

    #[test]
    fn test_condition_wire_format() {
        let edge = AgentEdge::conditional("a", "b", r#"status == "ok""#);
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["condition"]["type"], "conditional");
        assert_eq!(json["transformOutput"], false);
    }
}
