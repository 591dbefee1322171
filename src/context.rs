//! # Execution Context
//!
//! The mutable state threaded through one workflow run. The context is fully
//! serializable so it can ride inside a checkpoint and be restored on resume.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// One recorded step failure under the continue-on-error policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Failing step's id, or its tree path when it has no id.
    pub step_ref: String,
    pub error: String,
}

/// Mutable state for a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Opaque run identifier, stable across resumptions.
    pub run_id: Uuid,
    /// Initial payload; never mutated after start.
    pub input: JsonValue,
    /// Step outputs by id. Entries are never overwritten; duplicate ids are
    /// rejected at validation time, before execution.
    pub steps: HashMap<String, JsonValue>,
    /// Output of the most recently completed step; implicit input to the next.
    pub previous: JsonValue,
    /// Append-only record of every step output, in completion order.
    pub all: Vec<JsonValue>,
    /// Collected failures; present only while continue-on-error is active.
    pub errors: Option<Vec<StepFailure>>,
}

impl ExecutionContext {
    pub fn new(run_id: Uuid, input: JsonValue, collect_errors: bool) -> Self {
        Self {
            run_id,
            input,
            steps: HashMap::new(),
            previous: JsonValue::Null,
            all: Vec::new(),
            errors: collect_errors.then(Vec::new),
        }
    }

    /// Record a settled step's output: addressable by id when one is set,
    /// always visible as `previous` and in the audit trail.
    pub fn record_output(&mut self, id: Option<&str>, output: JsonValue) {
        if let Some(id) = id {
            self.steps.insert(id.to_string(), output.clone());
        }
        self.previous = output.clone();
        self.all.push(output);
    }

    /// Record a failure under the continue-on-error policy.
    pub fn record_failure(&mut self, step_ref: impl Into<String>, error: impl Into<String>) {
        self.errors
            .get_or_insert_with(Vec::new)
            .push(StepFailure {
                step_ref: step_ref.into(),
                error: error.into(),
            });
    }

    /// The implicit default input: `previous` once a step has completed,
    /// otherwise the run's initial payload.
    pub fn default_input(&self) -> &JsonValue {
        if self.previous.is_null() {
            &self.input
        } else {
            &self.previous
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_flow_through_previous_and_all() {
        let mut ctx = ExecutionContext::new(Uuid::new_v4(), json!({"seed": 1}), false);
        assert_eq!(ctx.default_input(), &json!({"seed": 1}));

        ctx.record_output(Some("a"), json!(10));
        ctx.record_output(None, json!(20));

        assert_eq!(ctx.steps.get("a"), Some(&json!(10)));
        assert_eq!(ctx.previous, json!(20));
        assert_eq!(ctx.all, vec![json!(10), json!(20)]);
        assert_eq!(ctx.default_input(), &json!(20));
    }

    #[test]
    fn failures_collect_only_under_policy() {
        let mut ctx = ExecutionContext::new(Uuid::new_v4(), JsonValue::Null, true);
        ctx.record_failure("b", "dispatch refused");
        let errors = ctx.errors.as_ref().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].step_ref, "b");
    }

    #[test]
    fn snapshot_round_trip() {
        let mut ctx = ExecutionContext::new(Uuid::new_v4(), json!("in"), true);
        ctx.record_output(Some("x"), json!({"n": 5}));
        let frozen = serde_json::to_string(&ctx).unwrap();
        let thawed: ExecutionContext = serde_json::from_str(&frozen).unwrap();
        assert_eq!(ctx, thawed);
    }
}
