//! Condition predicates for branch steps.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::input::ContextExpr;

/// Comparison operators for the "compare a prior step's field" descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Truthy,
    Falsy,
    Exists,
    NotExists,
}

/// Compare a field of a prior step's output against a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCompare {
    /// Step id whose output is inspected.
    pub step: String,
    /// Dotted path into that output; default is the whole value.
    #[serde(default)]
    pub path: Option<String>,
    pub op: CompareOp,
    /// Right-hand side for `eq`/`neq`; ignored by the unary operators.
    #[serde(default)]
    pub value: Option<JsonValue>,
}

/// A condition predicate: boolean literal, field comparison, or the
/// truthiness of a context expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    Literal(bool),
    Compare(FieldCompare),
    Expr(ContextExpr),
}

/// JavaScript-flavored truthiness, matching how upstream config producers
/// evaluate predicates: null, false, 0, and "" are falsy.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}
