//! Declarative input descriptors.
//!
//! Config-embedded functions cannot cross a serialization boundary, so the
//! only transportable forms are literals, context expressions, and the
//! "gather from prior steps" descriptor. All three are plain data and can be
//! re-evaluated on resume without side effects.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Where a context expression reads from.
///
/// Serialized form: `"input"`, `"previous"`, or `{"step": "step-id"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// The run's initial payload.
    Input,
    /// Output of the most recently completed step.
    Previous,
    /// Output of a specific prior step by id.
    Step(String),
}

/// A closed context expression: pick a source, optionally descend a dotted
/// path into it. This is the transportable replacement for arbitrary
/// functions of the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextExpr {
    pub from: ContextSource,
    /// Dotted path into the source value (for example `result.items`).
    #[serde(default)]
    pub path: Option<String>,
}

/// Gather outputs from prior steps into a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Step ids whose outputs are gathered, in the given order.
    pub from_steps: Vec<String>,
    /// Dotted path extracted from each output; default is the whole value.
    #[serde(default)]
    pub path: Option<String>,
    /// When set, gathered parts are concatenated with this separator into a
    /// `content` string; otherwise they are returned as a `data` array.
    #[serde(default)]
    pub join: Option<String>,
}

/// A step's effective-input descriptor. Untagged: the first matching shape
/// wins, so the structured forms are tried before the literal catch-all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    FromSteps(JoinSpec),
    Expr(ContextExpr),
    Literal(JsonValue),
}

/// Token descriptor for hook steps: a literal token or a context expression
/// resolved at suspension time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenSpec {
    Expr(ContextExpr),
    Literal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_precedence_picks_structured_forms_first() {
        let join: InputSpec =
            serde_json::from_value(json!({"from_steps": ["a", "b"], "join": "\n"})).unwrap();
        assert!(matches!(join, InputSpec::FromSteps(_)));

        let expr: InputSpec =
            serde_json::from_value(json!({"from": {"step": "a"}, "path": "out"})).unwrap();
        assert!(matches!(expr, InputSpec::Expr(_)));

        let literal: InputSpec = serde_json::from_value(json!({"name": "widget"})).unwrap();
        assert!(matches!(literal, InputSpec::Literal(_)));
    }

    #[test]
    fn context_source_wire_shapes() {
        let previous: ContextSource = serde_json::from_str("\"previous\"").unwrap();
        assert_eq!(previous, ContextSource::Previous);
        let step: ContextSource = serde_json::from_value(json!({"step": "fetch"})).unwrap();
        assert_eq!(step, ContextSource::Step("fetch".into()));
    }
}
