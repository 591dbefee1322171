//! # Input Resolver
//!
//! Computes a step's effective input from its declarative descriptor and the
//! live execution context. Pure and side-effect free by contract: the
//! interpreter may re-run resolution on resume without double-invoking
//! anything remote.

use serde_json::Value as JsonValue;

use crate::context::ExecutionContext;
use crate::model::{ContextExpr, ContextSource, InputSpec, JoinSpec};

/// Resolve a step's effective input. An absent descriptor defaults to
/// `previous` once a step has completed, otherwise the run input.
pub fn resolve_input(spec: Option<&InputSpec>, ctx: &ExecutionContext) -> JsonValue {
    match spec {
        None => ctx.default_input().clone(),
        Some(InputSpec::Literal(value)) => value.clone(),
        Some(InputSpec::Expr(expr)) => eval_expr(expr, ctx),
        Some(InputSpec::FromSteps(join)) => gather(join, ctx),
    }
}

/// Evaluate a context expression: pick the source, then descend the dotted
/// path. Missing sources and missing path segments yield `null`.
pub fn eval_expr(expr: &ContextExpr, ctx: &ExecutionContext) -> JsonValue {
    let source = match &expr.from {
        ContextSource::Input => &ctx.input,
        ContextSource::Previous => &ctx.previous,
        ContextSource::Step(id) => match ctx.steps.get(id) {
            Some(value) => value,
            None => return JsonValue::Null,
        },
    };
    match &expr.path {
        Some(path) => extract_path(source, path),
        None => source.clone(),
    }
}

/// Descend a dotted path (`result.items.0`) into a value. Array segments may
/// be numeric indices. Any miss yields `null`.
pub fn extract_path(value: &JsonValue, path: &str) -> JsonValue {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            JsonValue::Object(map) => match map.get(segment) {
                Some(next) => next,
                None => return JsonValue::Null,
            },
            JsonValue::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i))
            {
                Some(next) => next,
                None => return JsonValue::Null,
            },
            _ => return JsonValue::Null,
        };
    }
    current.clone()
}

/// Gather referenced step outputs: extract the optional path from each,
/// stringify non-strings, drop empties, and shape the result as either a
/// `data` array or a joined `content` string.
fn gather(join: &JoinSpec, ctx: &ExecutionContext) -> JsonValue {
    let mut parts: Vec<String> = Vec::with_capacity(join.from_steps.len());
    for id in &join.from_steps {
        let Some(output) = ctx.steps.get(id) else {
            continue;
        };
        let extracted = match &join.path {
            Some(path) => extract_path(output, path),
            None => output.clone(),
        };
        let text = stringify(&extracted);
        if !text.is_empty() {
            parts.push(text);
        }
    }

    match &join.join {
        Some(separator) => serde_json::json!({ "content": parts.join(separator) }),
        None => serde_json::json!({ "data": parts }),
    }
}

fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
