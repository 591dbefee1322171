//! Chained worker pipelines.
//!
//! A pipeline dispatches a sequence of workers where each step's input is the
//! previous step's output, tracked as one queue-job record whose overall
//! status is derived from step outcomes: `completed` when every step
//! completed, `failed` when nothing completed, `partial` otherwise.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{DispatchKind, DispatchOutcome, DispatchRequest, Dispatcher};
use crate::error::{EngineError, Result};
use crate::poller::{poll_until_done, PollOutcome, PollPolicy, Probe};
use crate::stores::{
    JobStatus, JobStore, JobUpdate, Patch, QueueJobRecord, QueueJobStep,
};

/// One pipeline stage.
#[derive(Debug, Clone)]
pub struct PipelineWorker {
    pub worker: String,
    /// Static input override; when absent the stage receives the previous
    /// stage's output (the pipeline input for the first stage).
    pub input: Option<JsonValue>,
}

/// Runs chained worker pipelines against a dispatcher and job store.
pub struct PipelineRunner {
    dispatcher: Arc<dyn Dispatcher>,
    job_store: Arc<dyn JobStore>,
    poll: PollPolicy,
}

impl PipelineRunner {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        job_store: Arc<dyn JobStore>,
        poll: PollPolicy,
    ) -> Self {
        Self {
            dispatcher,
            job_store,
            poll,
        }
    }

    /// Execute the pipeline to settlement and return the final queue-job
    /// record. A stage failure stops the chain; later stages stay `queued`.
    pub async fn run(
        &self,
        queue_job_id: Option<String>,
        workers: &[PipelineWorker],
        input: JsonValue,
    ) -> Result<QueueJobRecord> {
        if workers.is_empty() {
            return Err(EngineError::Configuration(
                "pipeline requires at least one worker".to_string(),
            ));
        }

        let queue_job_id = queue_job_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let steps = workers
            .iter()
            .map(|w| QueueJobStep::queued(w.worker.clone()))
            .collect();
        self.job_store
            .set_queue_job(QueueJobRecord::running(queue_job_id.clone(), steps))
            .await?;

        let mut carried = input;
        for (index, stage) in workers.iter().enumerate() {
            let stage_input = stage.input.clone().unwrap_or_else(|| carried.clone());

            let outcome = self
                .dispatcher
                .dispatch(DispatchRequest::new(
                    DispatchKind::Worker,
                    stage.worker.clone(),
                    stage_input.clone(),
                ))
                .await;

            let job_id = match outcome {
                Ok(DispatchOutcome::Accepted { id, .. }) => id,
                Ok(DispatchOutcome::Completed(_)) => {
                    // Workers are fire-and-forget by contract.
                    return Err(EngineError::Dispatch {
                        capability: stage.worker.clone(),
                        reason: "worker dispatch returned a blocking response".to_string(),
                        http_status: None,
                    });
                }
                Err(e) => {
                    self.mark_step(&queue_job_id, index, JobUpdate::failed(e.to_string()))
                        .await;
                    return self.finish(&queue_job_id).await;
                }
            };

            self.mark_step(
                &queue_job_id,
                index,
                JobUpdate {
                    status: Some(JobStatus::Running),
                    output: Patch::Keep,
                    error: Patch::Keep,
                    metadata: None,
                },
            )
            .await;

            let operation = format!("pipeline {queue_job_id} step {index}");
            let job_store = self.job_store.clone();
            let poll_job_id = job_id.clone();
            let settled = poll_until_done(&operation, &self.poll, move || {
                let job_store = job_store.clone();
                let job_id = poll_job_id.clone();
                async move {
                    match job_store.get_job(&job_id).await? {
                        Some(record) if record.status == JobStatus::Completed => {
                            Ok(Probe::Completed(record.output.unwrap_or(JsonValue::Null)))
                        }
                        Some(record) if record.status == JobStatus::Failed => Ok(Probe::Failed(
                            record
                                .error
                                .unwrap_or_else(|| "worker failed without detail".to_string()),
                        )),
                        _ => Ok(Probe::Pending),
                    }
                }
            })
            .await;

            match settled {
                PollOutcome::Completed(output) => {
                    info!(
                        queue_job_id = %queue_job_id,
                        step = index,
                        worker = %stage.worker,
                        "pipeline step completed"
                    );
                    self.mark_step(&queue_job_id, index, JobUpdate::completed(output.clone()))
                        .await;
                    carried = output;
                }
                PollOutcome::Failed(reason) => {
                    self.mark_step(&queue_job_id, index, JobUpdate::failed(reason))
                        .await;
                    return self.finish(&queue_job_id).await;
                }
                PollOutcome::TimedOut { waited_ms, .. } => {
                    self.mark_step(
                        &queue_job_id,
                        index,
                        JobUpdate::failed(format!("timed out after {waited_ms}ms")),
                    )
                    .await;
                    return self.finish(&queue_job_id).await;
                }
            }
        }

        self.finish(&queue_job_id).await
    }

    async fn mark_step(&self, queue_job_id: &str, index: usize, update: JobUpdate) {
        if let Err(e) = self
            .job_store
            .update_queue_step(queue_job_id, index, update)
            .await
        {
            warn!(queue_job_id = %queue_job_id, step = index, error = %e, "queue step update failed");
        }
    }

    async fn finish(&self, queue_job_id: &str) -> Result<QueueJobRecord> {
        self.job_store
            .get_queue_job(queue_job_id)
            .await?
            .ok_or_else(|| EngineError::Store {
                operation: "get_queue_job".to_string(),
                reason: format!("queue job '{queue_job_id}' disappeared"),
            })
    }
}
