//! The step tree: a closed sum type with seven variants, dispatched by
//! exhaustive pattern matching so adding a step type is a compile-time
//! checked change.

use serde::{Deserialize, Serialize};

use super::condition::ConditionSpec;
use super::duration::DurationSpec;
use super::input::{InputSpec, TokenSpec};
use crate::poller::PollPolicy;

/// One node of the workflow step tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Remote agent call; blocking by default.
    Agent(AgentStep),
    /// Background worker dispatch; always fire-and-forget at the wire level,
    /// optionally awaited through the completion poller.
    Worker(WorkerStep),
    /// Nested workflow invocation.
    Workflow(WorkflowStep),
    /// Human-in-the-loop wait on an external event token.
    Hook(HookStep),
    /// Timed pause.
    Sleep(SleepStep),
    /// Conditional branch.
    Condition(ConditionStep),
    /// Concurrent fan-out with a fan-in barrier.
    Parallel(ParallelStep),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    #[serde(default)]
    pub id: Option<String>,
    /// Capability identifier of the agent.
    pub agent: String,
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default = "default_true", rename = "await")]
    pub await_result: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStep {
    #[serde(default)]
    pub id: Option<String>,
    /// Capability identifier of the worker.
    pub worker: String,
    #[serde(default)]
    pub input: Option<InputSpec>,
    /// Awaiting a worker means polling its job record after the trigger;
    /// the dispatch itself never blocks.
    #[serde(default, rename = "await")]
    pub await_result: bool,
    /// Per-step override of the worker poll bounds.
    #[serde(default)]
    pub poll: Option<PollPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(default)]
    pub id: Option<String>,
    /// Capability identifier of the nested workflow.
    pub workflow: String,
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default = "default_true", rename = "await")]
    pub await_result: bool,
    /// Per-step override of the nested-run poll bounds.
    #[serde(default)]
    pub poll: Option<PollPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookStep {
    #[serde(default)]
    pub id: Option<String>,
    /// Wait token. May be absent in transported configs and reconstructed by
    /// the embedder before execution; the validator flags absence as a
    /// warning, the interpreter treats it as a hard error.
    #[serde(default)]
    pub token: Option<TokenSpec>,
    #[serde(default)]
    pub timeout: Option<DurationSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStep {
    pub duration: DurationSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionStep {
    #[serde(rename = "if")]
    pub predicate: ConditionSpec,
    pub then: Vec<Step>,
    #[serde(default, rename = "else")]
    pub otherwise: Option<Vec<Step>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelStep {
    /// Optional id addressing the aggregated `results` output.
    #[serde(default)]
    pub id: Option<String>,
    /// Branches executed concurrently; all settle before the step does.
    pub steps: Vec<Step>,
}

fn default_true() -> bool {
    true
}

impl Step {
    /// The step's own id, where the variant carries one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Step::Agent(s) => s.id.as_deref(),
            Step::Worker(s) => s.id.as_deref(),
            Step::Workflow(s) => s.id.as_deref(),
            Step::Hook(s) => s.id.as_deref(),
            Step::Sleep(_) | Step::Condition(_) => None,
            Step::Parallel(s) => s.id.as_deref(),
        }
    }

    /// Step kind for logging and error paths.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Agent(_) => "agent",
            Step::Worker(_) => "worker",
            Step::Workflow(_) => "workflow",
            Step::Hook(_) => "hook",
            Step::Sleep(_) => "sleep",
            Step::Condition(_) => "condition",
            Step::Parallel(_) => "parallel",
        }
    }

    /// The step's declared input descriptor, where the variant carries one.
    pub fn input(&self) -> Option<&InputSpec> {
        match self {
            Step::Agent(s) => s.input.as_ref(),
            Step::Worker(s) => s.input.as_ref(),
            Step::Workflow(s) => s.input.as_ref(),
            Step::Hook(_) | Step::Sleep(_) | Step::Condition(_) | Step::Parallel(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_tagged_variants() {
        let step: Step = serde_json::from_value(json!({
            "type": "agent",
            "id": "a1",
            "agent": "/summarize"
        }))
        .unwrap();
        match &step {
            Step::Agent(agent) => {
                assert_eq!(agent.agent, "/summarize");
                assert!(agent.await_result, "agent await defaults to true");
            }
            other => panic!("expected agent, got {other:?}"),
        }
        assert_eq!(step.id(), Some("a1"));
    }

    #[test]
    fn worker_await_defaults_to_false() {
        let step: Step =
            serde_json::from_value(json!({"type": "worker", "worker": "resize"})).unwrap();
        match step {
            Step::Worker(worker) => assert!(!worker.await_result),
            other => panic!("expected worker, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: Result<Step, _> =
            serde_json::from_value(json!({"type": "teleport", "target": "/moon"}));
        assert!(result.is_err());
    }

    #[test]
    fn condition_round_trips_with_keywords() {
        let step: Step = serde_json::from_value(json!({
            "type": "condition",
            "if": {"step": "check", "op": "truthy"},
            "then": [{"type": "sleep", "duration": 5}],
            "else": []
        }))
        .unwrap();
        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["if"]["op"], "truthy");
        assert!(back["then"].is_array());
    }
}
