//! End-to-end interpreter scenarios against an in-process dispatcher fake.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use stepflow_core::config::EngineConfig;
use stepflow_core::dispatch::{
    DispatchKind, DispatchOutcome, DispatchRequest, Dispatcher, RemoteStatus,
};
use stepflow_core::error::{EngineError, Result};
use stepflow_core::host::{InMemoryEventHub, TokioClock};
use stepflow_core::interpreter::continuation::{Checkpoint, PathSeg};
use stepflow_core::interpreter::StepInterpreter;
use stepflow_core::model::OrchestrationConfig;
use stepflow_core::stores::{
    InMemoryJobStore, InMemoryStatusStore, JobRecord, JobStatus, JobStore, RunStatus, StatusStore,
    StatusUpdate,
};

/// Scripted dispatcher: agents answer canned payloads, workers and workflows
/// are accepted with deterministic ids, and failures can be injected per
/// capability.
#[derive(Default)]
struct FakeDispatcher {
    agent_outputs: Mutex<HashMap<String, JsonValue>>,
    remaining_failures: Mutex<HashMap<String, u32>>,
    dispatch_counts: Mutex<HashMap<String, u32>>,
}

impl FakeDispatcher {
    fn set_agent(&self, capability: &str, output: JsonValue) {
        self.agent_outputs
            .lock()
            .insert(capability.to_string(), output);
    }

    fn fail_next(&self, capability: &str, times: u32) {
        self.remaining_failures
            .lock()
            .insert(capability.to_string(), times);
    }

    fn count(&self, capability: &str) -> u32 {
        self.dispatch_counts
            .lock()
            .get(capability)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome> {
        *self
            .dispatch_counts
            .lock()
            .entry(request.capability.clone())
            .or_insert(0) += 1;

        {
            let mut failures = self.remaining_failures.lock();
            if let Some(remaining) = failures.get_mut(&request.capability) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(EngineError::Dispatch {
                        capability: request.capability,
                        reason: "injected failure".to_string(),
                        http_status: Some(500),
                    });
                }
            }
        }

        match request.kind {
            DispatchKind::Agent => {
                let output = self
                    .agent_outputs
                    .lock()
                    .get(&request.capability)
                    .cloned()
                    .unwrap_or(JsonValue::Null);
                Ok(DispatchOutcome::Completed(output))
            }
            DispatchKind::Worker => Ok(DispatchOutcome::Accepted {
                id: format!("job-{}", request.capability),
                status: "queued".to_string(),
            }),
            DispatchKind::Workflow => Ok(DispatchOutcome::Accepted {
                id: format!("run-{}", request.capability),
                status: "running".to_string(),
            }),
        }
    }

    async fn probe(&self, _kind: DispatchKind, id: &str) -> Result<RemoteStatus> {
        Err(EngineError::Store {
            operation: "probe".to_string(),
            reason: format!("no remote status for '{id}'"),
        })
    }
}

struct Harness {
    interpreter: StepInterpreter,
    dispatcher: Arc<FakeDispatcher>,
    status_store: Arc<InMemoryStatusStore>,
    job_store: Arc<InMemoryJobStore>,
    events: Arc<InMemoryEventHub>,
}

fn harness() -> Harness {
    let dispatcher = Arc::new(FakeDispatcher::default());
    let status_store = Arc::new(InMemoryStatusStore::new());
    let job_store = Arc::new(InMemoryJobStore::new());
    let events = Arc::new(InMemoryEventHub::new());
    let interpreter = StepInterpreter::new(
        dispatcher.clone(),
        status_store.clone(),
        job_store.clone(),
        events.clone(),
        Arc::new(TokioClock),
        EngineConfig::default(),
    );
    Harness {
        interpreter,
        dispatcher,
        status_store,
        job_store,
        events,
    }
}

fn config_from(value: JsonValue) -> OrchestrationConfig {
    serde_json::from_value(value).expect("config deserializes")
}

#[tokio::test(start_paused = true)]
async fn sleep_then_agent_produces_final_result() {
    let h = harness();
    h.dispatcher.set_agent("/answer", json!(42));

    let config = config_from(json!({
        "steps": [
            {"type": "sleep", "duration": 10},
            {"type": "agent", "id": "a1", "agent": "/answer"}
        ]
    }));

    let outcome = h.interpreter.execute(&config).await.unwrap();
    assert_eq!(outcome.result, json!(42));
    assert_eq!(outcome.context.steps.get("a1"), Some(&json!(42)));

    let record = h
        .status_store
        .get_status(outcome.run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.result, Some(json!(42)));
}

#[tokio::test(start_paused = true)]
async fn awaited_worker_times_out_within_poll_budget() {
    let h = harness();
    let config = config_from(json!({
        "steps": [{
            "type": "worker", "id": "w1", "worker": "resize", "await": true,
            "poll": {"interval_ms": 100, "timeout_ms": 300, "max_retries": 10}
        }]
    }));

    let run_id = Uuid::new_v4();
    let err = h
        .interpreter
        .execute_with_ids(&config, run_id, None)
        .await
        .unwrap_err();
    match err {
        EngineError::PollTimeout { waited_ms, .. } => assert!(waited_ms <= 400),
        other => panic!("expected poll timeout, got {other:?}"),
    }

    let record = h.status_store.get_status(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn awaited_worker_settles_from_job_store() {
    let h = harness();
    let config = config_from(json!({
        "steps": [{
            "type": "worker", "id": "w1", "worker": "resize", "await": true,
            "poll": {"interval_ms": 100, "timeout_ms": 5000, "max_retries": 100}
        }]
    }));

    // Simulate the worker callback landing while the poll loop is waiting.
    let job_store = h.job_store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let mut record = JobRecord::queued("job-resize", "resize", JsonValue::Null);
        record.status = JobStatus::Completed;
        record.output = Some(json!({"thumb": "t.png"}));
        job_store.set_job(record).await.unwrap();
    });

    let outcome = h.interpreter.execute(&config).await.unwrap();
    let step = &outcome.context.steps["w1"];
    assert_eq!(step["status"], json!("completed"));
    assert_eq!(step["output"], json!({"thumb": "t.png"}));
    assert_eq!(step["job_id"], json!("job-resize"));
}

#[tokio::test(start_paused = true)]
async fn hook_suspends_until_event_delivery() {
    let h = harness();
    let config = config_from(json!({
        "steps": [{"type": "hook", "id": "h1", "token": "approve-123", "timeout": "1h"}]
    }));
    let run_id = Uuid::new_v4();

    let status_store = h.status_store.clone();
    let events = h.events.clone();
    tokio::spawn(async move {
        // Wait until the run actually reports paused before approving.
        loop {
            if let Some(record) = status_store.get_status(run_id).await.unwrap() {
                if record.status == RunStatus::Paused {
                    assert_eq!(record.hook_token.as_deref(), Some("approve-123"));
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        events.deliver("approve-123", json!({"approved": true}));
    });

    let outcome = h
        .interpreter
        .execute_with_ids(&config, run_id, None)
        .await
        .unwrap();
    assert_eq!(
        outcome.result,
        json!({"token": "approve-123", "payload": {"approved": true}})
    );

    let record = h.status_store.get_status(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.hook_token, None);
}

#[tokio::test]
async fn hook_with_empty_literal_token_is_refused() {
    let h = harness();
    let config = config_from(json!({
        "steps": [{"type": "hook", "token": ""}]
    }));

    let err = h.interpreter.execute(&config).await.unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
}

#[tokio::test(start_paused = true)]
async fn hook_timeout_fails_the_run() {
    let h = harness();
    let config = config_from(json!({
        "steps": [{"type": "hook", "token": "never-approved", "timeout": 50}]
    }));

    let err = h.interpreter.execute(&config).await.unwrap_err();
    assert!(matches!(err, EngineError::HookTimeout { .. }));
}

#[tokio::test]
async fn parallel_collects_branch_failures_under_policy() {
    let h = harness();
    h.dispatcher.set_agent("/a", json!("A"));
    h.dispatcher.set_agent("/c", json!("C"));
    h.dispatcher.fail_next("/b", 1);

    let config = config_from(json!({
        "continue_on_error": true,
        "steps": [{
            "type": "parallel", "id": "fan",
            "steps": [
                {"type": "agent", "id": "a", "agent": "/a"},
                {"type": "agent", "id": "b", "agent": "/b"},
                {"type": "agent", "id": "c", "agent": "/c"}
            ]
        }]
    }));

    let outcome = h.interpreter.execute(&config).await.unwrap();
    // The failed branch leaves a null gap at its position.
    assert_eq!(outcome.result, json!({"results": ["A", null, "C"]}));
    assert_eq!(outcome.context.steps["a"], json!("A"));
    assert_eq!(outcome.context.steps["c"], json!("C"));
    assert!(!outcome.context.steps.contains_key("b"));

    let errors = outcome.context.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step_ref, "b");
}

#[tokio::test]
async fn parallel_merges_nested_branch_step_outputs() {
    let h = harness();
    h.dispatcher.set_agent("/x", json!("X"));
    h.dispatcher.set_agent("/y", json!("Y"));
    h.dispatcher.set_agent("/join", json!("joined"));

    let config = config_from(json!({
        "steps": [
            {"type": "parallel", "steps": [
                {"type": "condition", "if": true,
                 "then": [{"type": "agent", "id": "x", "agent": "/x"}]},
                {"type": "agent", "id": "y", "agent": "/y"}
            ]},
            {"type": "agent", "id": "after", "agent": "/join",
             "input": {"from_steps": ["x", "y"], "join": " "}}
        ]
    }));

    let outcome = h.interpreter.execute(&config).await.unwrap();
    // Ids recorded inside a composite branch stay addressable after the
    // barrier, so the gather step sees both outputs.
    assert_eq!(outcome.context.steps["x"], json!("X"));
    assert_eq!(outcome.context.steps["y"], json!("Y"));
    assert_eq!(outcome.context.steps["after"], json!("joined"));
}

#[tokio::test]
async fn parallel_fails_fast_without_policy() {
    let h = harness();
    h.dispatcher.set_agent("/a", json!("A"));
    h.dispatcher.fail_next("/b", 1);

    let config = config_from(json!({
        "steps": [{
            "type": "parallel",
            "steps": [
                {"type": "agent", "id": "a", "agent": "/a"},
                {"type": "agent", "id": "b", "agent": "/b"}
            ]
        }]
    }));

    let run_id = Uuid::new_v4();
    let err = h
        .interpreter
        .execute_with_ids(&config, run_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Dispatch { .. }));

    let record = h.status_store.get_status(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error.unwrap().contains("/b"));
}

#[tokio::test]
async fn condition_routes_on_prior_step_output() {
    let h = harness();
    h.dispatcher.set_agent("/score", json!({"score": 7}));
    h.dispatcher.set_agent("/high", json!("high road"));
    h.dispatcher.set_agent("/low", json!("low road"));

    let config = config_from(json!({
        "steps": [
            {"type": "agent", "id": "score", "agent": "/score"},
            {"type": "condition",
             "if": {"step": "score", "path": "score", "op": "eq", "value": 7},
             "then": [{"type": "agent", "id": "route", "agent": "/high"}],
             "else": [{"type": "agent", "id": "fallback", "agent": "/low"}]}
        ]
    }));

    let outcome = h.interpreter.execute(&config).await.unwrap();
    assert_eq!(outcome.result, json!("high road"));
    assert_eq!(h.dispatcher.count("/low"), 0);
}

#[tokio::test]
async fn resume_skips_settled_steps() {
    let h = harness();
    h.dispatcher.set_agent("/first", json!({"n": 1}));
    h.dispatcher.set_agent("/second", json!({"n": 2}));

    let config = config_from(json!({
        "steps": [
            {"type": "agent", "id": "first", "agent": "/first"},
            {"type": "agent", "id": "second", "agent": "/second"}
        ]
    }));

    // Seed the store with the snapshot a process dying after the first step
    // would have left behind.
    let run_id = Uuid::new_v4();
    let mut ctx = stepflow_core::ExecutionContext::new(run_id, JsonValue::Null, false);
    ctx.record_output(Some("first"), json!({"n": 1}));
    let checkpoint = Checkpoint::new(vec![PathSeg::Seq(0)], ctx);
    h.status_store
        .set_status(
            run_id,
            StatusUpdate::status(RunStatus::Running).with_checkpoint(checkpoint),
        )
        .await
        .unwrap();

    let outcome = h.interpreter.resume(run_id, &config).await.unwrap();
    assert_eq!(outcome.result, json!({"n": 2}));
    assert_eq!(outcome.context.steps["first"], json!({"n": 1}));
    // The settled step is never re-dispatched.
    assert_eq!(h.dispatcher.count("/first"), 0);
    assert_eq!(h.dispatcher.count("/second"), 1);

    let record = h.status_store.get_status(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
}

#[tokio::test]
async fn resume_refuses_terminal_runs() {
    let h = harness();
    let config = config_from(json!({
        "steps": [{"type": "agent", "id": "a", "agent": "/a"}]
    }));

    let run_id = Uuid::new_v4();
    h.status_store
        .set_status(run_id, StatusUpdate::completed(json!("done")))
        .await
        .unwrap();

    let err = h.interpreter.resume(run_id, &config).await.unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
}

#[tokio::test]
async fn blocking_validation_errors_refuse_execution() {
    let h = harness();
    let config = config_from(json!({"steps": []}));

    let err = h.interpreter.execute(&config).await.unwrap_err();
    match err {
        EngineError::Validation { reasons } => {
            assert!(reasons.iter().any(|r| r.contains("EMPTY_STEPS")));
        }
        other => panic!("expected validation refusal, got {other:?}"),
    }
    // Nothing was dispatched.
    assert_eq!(h.dispatcher.count("/a"), 0);
}

#[tokio::test]
async fn continue_on_error_runs_remaining_siblings() {
    let h = harness();
    h.dispatcher.set_agent("/ok", json!("fine"));
    h.dispatcher.fail_next("/broken", 1);

    let config = config_from(json!({
        "continue_on_error": true,
        "steps": [
            {"type": "agent", "id": "bad", "agent": "/broken"},
            {"type": "agent", "id": "good", "agent": "/ok"}
        ]
    }));

    let outcome = h.interpreter.execute(&config).await.unwrap();
    assert_eq!(outcome.result, json!("fine"));
    let errors = outcome.context.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].step_ref, "bad");
}
