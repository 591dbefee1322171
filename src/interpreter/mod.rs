//! # Step Interpreter
//!
//! Walks a validated step tree against a live execution context, dispatching
//! remote work through the [`Dispatcher`] seam and suspending through the
//! host substrate. After every settled step the interpreter persists a
//! checkpoint, so a crashed or suspended run can be resumed from its status
//! record without re-invoking anything already done.

pub mod continuation;

use futures::future::{join_all, BoxFuture};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::events;
use crate::context::ExecutionContext;
use crate::dispatch::{DispatchKind, DispatchOutcome, DispatchRequest, Dispatcher};
use crate::error::{EngineError, Result};
use crate::host::{Clock, EventWaiter};
use crate::model::condition::{is_truthy, CompareOp, ConditionSpec};
use crate::model::{OrchestrationConfig, Step, TokenSpec};
use crate::poller::{poll_until_done, Probe};
use crate::resolver::{eval_expr, extract_path, resolve_input};
use crate::stores::{JobStatus, JobStore, RunStatus, StatusStore, StatusUpdate};
use crate::validation::{has_blocking_errors, validate, Severity};
use continuation::{render_path, Checkpoint, FastForward, PathSeg, ReplayPlan};

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// The last settled step's output.
    pub result: JsonValue,
    /// Final context, including per-step outputs and any collected failures.
    pub context: ExecutionContext,
}

/// The workflow engine proper: config in, dispatches out.
pub struct StepInterpreter {
    dispatcher: Arc<dyn Dispatcher>,
    status_store: Arc<dyn StatusStore>,
    job_store: Arc<dyn JobStore>,
    events: Arc<dyn EventWaiter>,
    clock: Arc<dyn Clock>,
    engine: EngineConfig,
}

impl StepInterpreter {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        status_store: Arc<dyn StatusStore>,
        job_store: Arc<dyn JobStore>,
        events: Arc<dyn EventWaiter>,
        clock: Arc<dyn Clock>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            dispatcher,
            status_store,
            job_store,
            events,
            clock,
            engine,
        }
    }

    /// Execute a config from the top under a fresh run id.
    pub async fn execute(&self, config: &OrchestrationConfig) -> Result<RunOutcome> {
        self.execute_with_ids(config, Uuid::new_v4(), None).await
    }

    /// Execute under caller-chosen identifiers. The execution id is the
    /// external lookup key for callers that do not yet know the run id.
    pub async fn execute_with_ids(
        &self,
        config: &OrchestrationConfig,
        run_id: Uuid,
        execution_id: Option<String>,
    ) -> Result<RunOutcome> {
        self.preflight(config)?;

        let mut update = StatusUpdate::status(RunStatus::Running);
        if let Some(execution_id) = execution_id {
            update = update.with_execution_id(execution_id);
        }
        self.persist(run_id, update, "start").await;
        info!(
            event = events::RUN_STARTED,
            run_id = %run_id,
            steps = config.steps.len(),
            "🚀 workflow run started"
        );

        let ctx = ExecutionContext::new(run_id, config.input.clone(), config.continue_on_error);
        self.run_to_completion(config, ctx, FastForward::none())
            .await
    }

    /// Resume a previously checkpointed run. Settled steps are skipped by
    /// cursor position, not re-evaluated, so no remote call is repeated.
    pub async fn resume(&self, run_id: Uuid, config: &OrchestrationConfig) -> Result<RunOutcome> {
        self.preflight(config)?;

        let record = self
            .status_store
            .get_status(run_id)
            .await?
            .ok_or_else(|| EngineError::Store {
                operation: "get_status".to_string(),
                reason: format!("no status record for run {run_id}"),
            })?;

        if record.status.is_terminal() {
            return Err(EngineError::Configuration(format!(
                "run {run_id} is already {}",
                record.status
            )));
        }

        let checkpoint = record.checkpoint.ok_or_else(|| EngineError::Store {
            operation: "resume".to_string(),
            reason: format!("run {run_id} has no checkpoint to resume from"),
        })?;

        self.persist(run_id, StatusUpdate::resumed(), "resume").await;
        info!(
            event = events::RUN_RESUMED,
            run_id = %run_id,
            cursor = %render_path(&checkpoint.cursor),
            "▶️ run resumed from checkpoint"
        );

        self.run_to_completion(config, checkpoint.context, FastForward::to(checkpoint.cursor))
            .await
    }

    fn preflight(&self, config: &OrchestrationConfig) -> Result<()> {
        let report = validate(config);
        for finding in report.iter().filter(|e| e.severity == Severity::Warning) {
            warn!(code = %finding.code, path = %finding.path, detail = %finding.detail, "validation warning");
        }
        if has_blocking_errors(&report) {
            return Err(EngineError::Validation {
                reasons: report
                    .iter()
                    .filter(|e| e.severity == Severity::Error)
                    .map(ToString::to_string)
                    .collect(),
            });
        }
        Ok(())
    }

    async fn run_to_completion(
        &self,
        config: &OrchestrationConfig,
        mut ctx: ExecutionContext,
        mut ff: FastForward,
    ) -> Result<RunOutcome> {
        let run_id = ctx.run_id;
        let walked = self
            .execute_sequence(&config.steps, &mut ctx, Vec::new(), &mut ff, config, true)
            .await;

        match walked {
            Ok(()) => {
                let result = ctx.previous.clone();
                self.persist(run_id, StatusUpdate::completed(result.clone()), "complete")
                    .await;
                info!(event = events::RUN_COMPLETED, run_id = %run_id, "✅ workflow run completed");
                Ok(RunOutcome {
                    run_id,
                    result,
                    context: ctx,
                })
            }
            Err(e) => {
                self.persist(run_id, StatusUpdate::failed(e.to_string()), "fail")
                    .await;
                error!(event = events::RUN_FAILED, run_id = %run_id, error = %e, "❌ workflow run failed");
                Err(e)
            }
        }
    }

    /// Walk one step sequence. The continue-on-error policy is scoped to
    /// siblings: a failing step's own children never run, but its siblings
    /// do. `checkpoints` is off inside parallel branches, which only
    /// checkpoint at the fan-in barrier.
    fn execute_sequence<'a>(
        &'a self,
        steps: &'a [Step],
        ctx: &'a mut ExecutionContext,
        prefix: Vec<PathSeg>,
        ff: &'a mut FastForward,
        config: &'a OrchestrationConfig,
        checkpoints: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for (index, step) in steps.iter().enumerate() {
                let mut path = prefix.clone();
                path.push(PathSeg::Seq(index));

                let plan = ff.plan(&path);
                if plan == ReplayPlan::Skip {
                    debug!(
                        event = events::STEP_SKIPPED,
                        path = %render_path(&path),
                        kind = step.kind(),
                        "step already settled; fast-forwarding"
                    );
                    continue;
                }

                let step_ref = step
                    .id()
                    .map(str::to_string)
                    .unwrap_or_else(|| render_path(&path));
                debug!(
                    event = events::STEP_STARTED,
                    step_ref = %step_ref,
                    kind = step.kind(),
                    "step started"
                );

                let settled = if plan == ReplayPlan::Descend {
                    self.descend(step, ctx, &path, ff, config, checkpoints).await
                } else {
                    self.execute_step(step, ctx, &path, ff, config, checkpoints)
                        .await
                };

                match settled {
                    Ok(()) => {
                        debug!(
                            event = events::STEP_COMPLETED,
                            step_ref = %step_ref,
                            kind = step.kind(),
                            "step completed"
                        );
                        if checkpoints {
                            self.save_checkpoint(ctx, &path).await;
                        }
                    }
                    Err(e) if config.continue_on_error => {
                        warn!(
                            event = events::STEP_FAILED,
                            step_ref = %step_ref,
                            error = %e,
                            "step failed; continuing per policy"
                        );
                        ctx.record_failure(step_ref, e.to_string());
                        if checkpoints {
                            self.save_checkpoint(ctx, &path).await;
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
    }

    /// Follow the checkpoint cursor into a composite step without
    /// re-evaluating its predicate: the recorded branch is authoritative.
    async fn descend(
        &self,
        step: &Step,
        ctx: &mut ExecutionContext,
        path: &[PathSeg],
        ff: &mut FastForward,
        config: &OrchestrationConfig,
        checkpoints: bool,
    ) -> Result<()> {
        if let Step::Condition(cond) = step {
            match ff.segment_at(path.len()) {
                Some(PathSeg::Then) => {
                    let mut branch = path.to_vec();
                    branch.push(PathSeg::Then);
                    self.execute_sequence(&cond.then, ctx, branch, ff, config, checkpoints)
                        .await
                }
                Some(PathSeg::Else) => match &cond.otherwise {
                    Some(otherwise) => {
                        let mut branch = path.to_vec();
                        branch.push(PathSeg::Else);
                        self.execute_sequence(otherwise, ctx, branch, ff, config, checkpoints)
                            .await
                    }
                    None => Ok(()),
                },
                _ => {
                    self.execute_step(step, ctx, path, ff, config, checkpoints)
                        .await
                }
            }
        } else {
            // A cursor under a non-condition node means the tree changed
            // between save and resume; run the step fresh.
            self.execute_step(step, ctx, path, ff, config, checkpoints)
                .await
        }
    }

    /// Boxed so the parallel arm can recurse through a type-erased future,
    /// same as [`Self::execute_sequence`].
    fn execute_step<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        path: &'a [PathSeg],
        ff: &'a mut FastForward,
        config: &'a OrchestrationConfig,
        checkpoints: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let step_ref = step
                .id()
                .map(str::to_string)
                .unwrap_or_else(|| render_path(path));

            match step {
                Step::Agent(agent) => {
                    let input = resolve_input(agent.input.as_ref(), ctx);
                    let mut request =
                        DispatchRequest::new(DispatchKind::Agent, agent.agent.clone(), input);
                    request.messages = config.messages.clone();
                    request.awaited = agent.await_result;

                    let output = match self.dispatcher.dispatch(request).await? {
                        DispatchOutcome::Completed(value) => value,
                        DispatchOutcome::Accepted { id, status } => json!({"id": id, "status": status}),
                    };
                    ctx.record_output(agent.id.as_deref(), output);
                }

                Step::Worker(worker) => {
                    let input = resolve_input(worker.input.as_ref(), ctx);
                    // The trigger never blocks; awaiting happens against the job
                    // record the worker callback updates.
                    let request =
                        DispatchRequest::new(DispatchKind::Worker, worker.worker.clone(), input);
                    let (job_id, status) = match self.dispatcher.dispatch(request).await? {
                        DispatchOutcome::Accepted { id, status } => (id, status),
                        DispatchOutcome::Completed(_) => {
                            return Err(EngineError::Dispatch {
                                capability: worker.worker.clone(),
                                reason: "worker dispatch returned a blocking response".to_string(),
                                http_status: None,
                            })
                        }
                    };
                    info!(
                        event = events::JOB_DISPATCHED,
                        job_id = %job_id,
                        worker = %worker.worker,
                        awaited = worker.await_result,
                        "worker job dispatched"
                    );

                    if worker.await_result {
                        let policy = worker
                            .poll
                            .or(config.worker_poll)
                            .unwrap_or(self.engine.worker_poll);
                        let job_store = self.job_store.clone();
                        let poll_id = job_id.clone();
                        let outcome = poll_until_done(&step_ref, &policy, move || {
                            let job_store = job_store.clone();
                            let job_id = poll_id.clone();
                            async move {
                                match job_store.get_job(&job_id).await? {
                                    Some(record) if record.status == JobStatus::Completed => Ok(
                                        Probe::Completed(record.output.unwrap_or(JsonValue::Null)),
                                    ),
                                    Some(record) if record.status == JobStatus::Failed => {
                                        Ok(Probe::Failed(record.error.unwrap_or_else(|| {
                                            "worker failed without detail".to_string()
                                        })))
                                    }
                                    _ => Ok(Probe::Pending),
                                }
                            }
                        })
                        .await;
                        let output = outcome.into_result(&step_ref)?;

                        let metadata = self
                            .job_store
                            .get_job(&job_id)
                            .await
                            .ok()
                            .flatten()
                            .map(|record| {
                                serde_json::to_value(record.metadata).unwrap_or(JsonValue::Null)
                            })
                            .unwrap_or(JsonValue::Null);
                        info!(event = events::JOB_COMPLETED, job_id = %job_id, "worker job completed");
                        ctx.record_output(
                            worker.id.as_deref(),
                            json!({
                                "job_id": job_id,
                                "status": "completed",
                                "output": output,
                                "metadata": metadata,
                            }),
                        );
                    } else {
                        ctx.record_output(
                            worker.id.as_deref(),
                            json!({"job_id": job_id, "status": status}),
                        );
                    }
                }

                Step::Workflow(workflow) => {
                    let input = resolve_input(workflow.input.as_ref(), ctx);
                    let request =
                        DispatchRequest::new(DispatchKind::Workflow, workflow.workflow.clone(), input);
                    let (nested_id, status) = match self.dispatcher.dispatch(request).await? {
                        DispatchOutcome::Accepted { id, status } => (id, status),
                        DispatchOutcome::Completed(value) => {
                            // A synchronously completed nested run needs no poll.
                            ctx.record_output(workflow.id.as_deref(), value);
                            return Ok(());
                        }
                    };

                    if workflow.await_result {
                        let policy = workflow
                            .poll
                            .or(config.worker_poll)
                            .unwrap_or(self.engine.worker_poll);
                        let dispatcher = self.dispatcher.clone();
                        let poll_id = nested_id.clone();
                        let outcome = poll_until_done(&step_ref, &policy, move || {
                            let dispatcher = dispatcher.clone();
                            let id = poll_id.clone();
                            async move {
                                Ok(dispatcher
                                    .probe(DispatchKind::Workflow, &id)
                                    .await?
                                    .to_probe())
                            }
                        })
                        .await;
                        let output = outcome.into_result(&step_ref)?;
                        ctx.record_output(workflow.id.as_deref(), output);
                    } else {
                        ctx.record_output(
                            workflow.id.as_deref(),
                            json!({"run_id": nested_id, "status": status}),
                        );
                    }
                }

                Step::Hook(hook) => {
                    let token = match &hook.token {
                        Some(TokenSpec::Literal(token)) if !token.is_empty() => token.clone(),
                        Some(TokenSpec::Expr(expr)) => match eval_expr(expr, ctx) {
                            JsonValue::String(s) if !s.is_empty() => s,
                            JsonValue::Null | JsonValue::String(_) => {
                                return Err(EngineError::Configuration(format!(
                                    "hook at {} resolved an empty token",
                                    render_path(path)
                                )))
                            }
                            other => other.to_string(),
                        },
                        // An empty literal suspends forever with nothing to
                        // deliver against; refuse it like an absent token.
                        _ => {
                            return Err(EngineError::Configuration(format!(
                                "hook at {} has no resolvable token",
                                render_path(path)
                            )))
                        }
                    };

                    let timeout = match hook.timeout.as_ref().or(config.hook_timeout.as_ref()) {
                        Some(spec) => spec.to_duration()?,
                        None => Duration::from_millis(self.engine.hook_timeout_ms),
                    };

                    self.persist(ctx.run_id, StatusUpdate::paused_on(token.clone()), "pause")
                        .await;
                    info!(
                        event = events::RUN_PAUSED,
                        run_id = %ctx.run_id,
                        token = %token,
                        timeout_ms = timeout.as_millis() as u64,
                        "⏸️ run paused on hook"
                    );

                    let payload = self.events.wait(&token, timeout).await?;

                    self.persist(ctx.run_id, StatusUpdate::resumed(), "unpause")
                        .await;
                    info!(event = events::RUN_RESUMED, run_id = %ctx.run_id, token = %token, "hook event received");
                    ctx.record_output(
                        hook.id.as_deref(),
                        json!({"token": token, "payload": payload}),
                    );
                }

                Step::Sleep(sleep) => {
                    let duration = sleep.duration.to_duration()?;
                    debug!(path = %render_path(path), duration_ms = duration.as_millis() as u64, "sleeping");
                    self.clock.sleep(duration).await;
                    // No steps entry (sleeps carry no id), but the output still
                    // flows through `previous` and the audit trail.
                    ctx.record_output(None, json!({"slept": duration.as_millis() as u64}));
                }

                Step::Condition(cond) => {
                    let verdict = evaluate_predicate(&cond.predicate, ctx);
                    debug!(path = %render_path(path), verdict, "condition evaluated");
                    if verdict {
                        let mut branch = path.to_vec();
                        branch.push(PathSeg::Then);
                        self.execute_sequence(&cond.then, ctx, branch, ff, config, checkpoints)
                            .await?;
                    } else if let Some(otherwise) = &cond.otherwise {
                        let mut branch = path.to_vec();
                        branch.push(PathSeg::Else);
                        self.execute_sequence(otherwise, ctx, branch, ff, config, checkpoints)
                            .await?;
                    }
                }

                Step::Parallel(par) => {
                    // Every branch runs against a snapshot of the context as of
                    // the barrier entry; merge happens only after all settle.
                    let base_errors = ctx.errors.as_ref().map(Vec::len).unwrap_or(0);
                    let snapshot = ctx.clone();

                    let mut branch_futures: Vec<
                        BoxFuture<'_, (usize, std::result::Result<ExecutionContext, EngineError>)>,
                    > = Vec::with_capacity(par.steps.len());
                    for (index, branch) in par.steps.iter().enumerate() {
                        let mut child = snapshot.clone();
                        let mut branch_path = path.to_vec();
                        branch_path.push(PathSeg::Branch(index));
                        branch_futures.push(Box::pin(async move {
                            let mut branch_ff = FastForward::none();
                            let settled = self
                                .execute_step(branch, &mut child, &branch_path, &mut branch_ff, config, false)
                                .await;
                            (index, settled.map(|()| child))
                        }));
                    }

                    let settled = join_all(branch_futures).await;

                    let mut children: Vec<(usize, ExecutionContext)> = Vec::new();
                    let mut failures: Vec<(usize, EngineError)> = Vec::new();
                    for (index, outcome) in settled {
                        match outcome {
                            Ok(child) => children.push((index, child)),
                            Err(e) => failures.push((index, e)),
                        }
                    }

                    if !failures.is_empty() && !config.continue_on_error {
                        // Fail fast after the barrier: successful branch outputs
                        // are dropped, the first failure in branch order wins.
                        let (index, first) = failures.remove(0);
                        warn!(
                            path = %render_path(path),
                            branch = index,
                            error = %first,
                            "parallel branch failed"
                        );
                        return Err(first);
                    }

                    let mut results = vec![JsonValue::Null; par.steps.len()];
                    for (index, child) in children {
                        let output = child.previous.clone();
                        // Every id the branch recorded stays addressable after
                        // the barrier, including ids nested inside composites.
                        for (id, value) in child.steps {
                            if !snapshot.steps.contains_key(&id) {
                                ctx.steps.insert(id, value);
                            }
                        }
                        ctx.all.push(output.clone());
                        if let Some(child_failures) = child.errors {
                            for failure in child_failures.into_iter().skip(base_errors) {
                                ctx.errors.get_or_insert_with(Vec::new).push(failure);
                            }
                        }
                        results[index] = output;
                    }

                    for (index, failure) in failures {
                        let branch_ref = par.steps[index].id().map(str::to_string).unwrap_or_else(|| {
                            let mut branch_path = path.to_vec();
                            branch_path.push(PathSeg::Branch(index));
                            render_path(&branch_path)
                        });
                        warn!(
                            event = events::STEP_FAILED,
                            step_ref = %branch_ref,
                            error = %failure,
                            "parallel branch failed; continuing per policy"
                        );
                        ctx.record_failure(branch_ref, failure.to_string());
                    }

                    let aggregate = json!({ "results": results });
                    if let Some(id) = &par.id {
                        ctx.steps.insert(id.clone(), aggregate.clone());
                    }
                    ctx.previous = aggregate;
                }
            }

            Ok(())
        })
    }

    async fn save_checkpoint(&self, ctx: &ExecutionContext, path: &[PathSeg]) {
        let checkpoint = Checkpoint::new(path.to_vec(), ctx.clone());
        self.persist(
            ctx.run_id,
            StatusUpdate::default().with_checkpoint(checkpoint),
            "checkpoint",
        )
        .await;
    }

    /// Status writes are best effort: the run keeps its in-memory truth and
    /// a failed write costs observability, not correctness.
    async fn persist(&self, run_id: Uuid, update: StatusUpdate, operation: &str) {
        if let Err(e) = self.status_store.set_status(run_id, update).await {
            warn!(run_id = %run_id, operation = %operation, error = %e, "status write failed; run continues");
        }
    }
}

/// Evaluate a condition predicate against the context. A comparison against a
/// step that never ran sees `null`, so `exists` is false and `eq null` true.
fn evaluate_predicate(spec: &ConditionSpec, ctx: &ExecutionContext) -> bool {
    match spec {
        ConditionSpec::Literal(value) => *value,
        ConditionSpec::Expr(expr) => is_truthy(&eval_expr(expr, ctx)),
        ConditionSpec::Compare(compare) => {
            let value = ctx
                .steps
                .get(&compare.step)
                .map(|output| match &compare.path {
                    Some(path) => extract_path(output, path),
                    None => output.clone(),
                })
                .unwrap_or(JsonValue::Null);
            match compare.op {
                CompareOp::Eq => value == *compare.value.as_ref().unwrap_or(&JsonValue::Null),
                CompareOp::Neq => value != *compare.value.as_ref().unwrap_or(&JsonValue::Null),
                CompareOp::Truthy => is_truthy(&value),
                CompareOp::Falsy => !is_truthy(&value),
                CompareOp::Exists => !value.is_null(),
                CompareOp::NotExists => value.is_null(),
            }
        }
    }
}
