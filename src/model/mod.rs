//! # Workflow Data Model
//!
//! Serde models for the declarative step tree and the orchestration config
//! that wraps it. Everything here is plain data: the tree survives transport
//! and persistence unchanged, which is what makes runs resumable.

pub mod condition;
pub mod duration;
pub mod input;
pub mod step;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use condition::{CompareOp, ConditionSpec, FieldCompare};
pub use duration::DurationSpec;
pub use input::{ContextExpr, ContextSource, InputSpec, JoinSpec, TokenSpec};
pub use step::{
    AgentStep, ConditionStep, HookStep, ParallelStep, SleepStep, Step, WorkerStep, WorkflowStep,
};

use crate::poller::PollPolicy;

/// One conversation message passed through to agent dispatches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// The validated unit of execution: a root step sequence plus run-wide
/// policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub steps: Vec<Step>,
    /// Initial payload; immutable once the run starts.
    #[serde(default)]
    pub input: JsonValue,
    /// Conversation history forwarded to agent capabilities.
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    /// Collect step failures and keep going instead of aborting the run.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Default timeout for hook waits; overridable per hook step.
    #[serde(default)]
    pub hook_timeout: Option<DurationSpec>,
    /// Default poll bounds for awaited workers and nested runs; overridable
    /// per step.
    #[serde(default)]
    pub worker_poll: Option<PollPolicy>,
}

impl OrchestrationConfig {
    /// Minimal config around a root sequence, everything else defaulted.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            input: JsonValue::Null,
            messages: None,
            continue_on_error: false,
            hook_timeout: None,
            worker_poll: None,
        }
    }

    pub fn with_input(mut self, input: JsonValue) -> Self {
        self.input = input;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_transport_round_trip() {
        let config: OrchestrationConfig = serde_json::from_value(json!({
            "steps": [
                {"type": "sleep", "duration": "10s"},
                {"type": "agent", "id": "a1", "agent": "/x"},
                {"type": "parallel", "steps": [
                    {"type": "worker", "id": "w1", "worker": "thumbs"},
                    {"type": "hook", "id": "h1", "token": "approve-123", "timeout": "1h"}
                ]}
            ],
            "input": {"doc": "readme"},
            "continue_on_error": true,
            "worker_poll": {"interval_ms": 100, "timeout_ms": 300, "max_retries": 10}
        }))
        .unwrap();

        let wire = serde_json::to_value(&config).unwrap();
        let back: OrchestrationConfig = serde_json::from_value(wire).unwrap();
        assert_eq!(config, back);
    }
}
