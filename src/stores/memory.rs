//! In-memory store backends for development and tests.
//!
//! DashMap entries give per-record locking, which is exactly the granularity
//! the merge-upsert contract requires.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::records::{
    JobRecord, JobUpdate, QueueJobRecord, StatusUpdate, WorkflowStatusRecord,
};
use super::{JobStore, StatusStore};
use crate::error::{EngineError, Result};
use crate::stores::records::JobStatus;

/// DashMap-backed status store.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    records: DashMap<Uuid, WorkflowStatusRecord>,
    by_execution_id: DashMap<String, Uuid>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn set_status(&self, run_id: Uuid, update: StatusUpdate) -> Result<()> {
        let mut entry = self
            .records
            .entry(run_id)
            .or_insert_with(|| WorkflowStatusRecord::new(run_id));
        let record = entry.value_mut();

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(execution_id) = update.execution_id {
            self.by_execution_id.insert(execution_id.clone(), run_id);
            record.execution_id = Some(execution_id);
        }
        update.hook_token.apply(&mut record.hook_token);
        update.result.apply(&mut record.result);
        update.error.apply(&mut record.error);
        update.checkpoint.apply(&mut record.checkpoint);
        if let Some(metadata) = update.metadata {
            record.metadata.extend(metadata);
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn get_status(&self, run_id: Uuid) -> Result<Option<WorkflowStatusRecord>> {
        Ok(self.records.get(&run_id).map(|r| r.value().clone()))
    }

    async fn run_id_by_execution_id(&self, execution_id: &str) -> Result<Option<Uuid>> {
        Ok(self.by_execution_id.get(execution_id).map(|r| *r.value()))
    }
}

/// DashMap-backed job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<String, JobRecord>,
    queue_jobs: DashMap<String, QueueJobRecord>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn set_job(&self, record: JobRecord) -> Result<()> {
        self.jobs.insert(record.job_id.clone(), record);
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        Ok(self.jobs.get(job_id).map(|r| r.value().clone()))
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<()> {
        let mut entry = self.jobs.get_mut(job_id).ok_or_else(|| EngineError::Store {
            operation: "update_job".to_string(),
            reason: format!("job '{job_id}' not found"),
        })?;
        let record = entry.value_mut();

        if record.status.is_terminal() {
            debug!(job_id = %job_id, status = %record.status, "discarding update to terminal job");
            return Ok(());
        }

        if let Some(status) = update.status {
            record.status = status;
        }
        update.output.apply(&mut record.output);
        update.error.apply(&mut record.error);
        if let Some(metadata) = update.metadata {
            record.metadata.extend(metadata);
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn append_internal_job(&self, job_id: &str, child: JobRecord) -> Result<()> {
        let mut entry = self.jobs.get_mut(job_id).ok_or_else(|| EngineError::Store {
            operation: "append_internal_job".to_string(),
            reason: format!("job '{job_id}' not found"),
        })?;
        let record = entry.value_mut();
        record.internal_jobs.push(child);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn jobs_by_worker(&self, worker_id: &str) -> Result<Vec<JobRecord>> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .iter()
            .filter(|r| r.value().worker_id == worker_id)
            .map(|r| r.value().clone())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn set_queue_job(&self, record: QueueJobRecord) -> Result<()> {
        self.queue_jobs.insert(record.queue_job_id.clone(), record);
        Ok(())
    }

    async fn get_queue_job(&self, queue_job_id: &str) -> Result<Option<QueueJobRecord>> {
        Ok(self.queue_jobs.get(queue_job_id).map(|r| r.value().clone()))
    }

    async fn update_queue_step(
        &self,
        queue_job_id: &str,
        step_index: usize,
        update: JobUpdate,
    ) -> Result<()> {
        let mut entry = self
            .queue_jobs
            .get_mut(queue_job_id)
            .ok_or_else(|| EngineError::Store {
                operation: "update_queue_step".to_string(),
                reason: format!("queue job '{queue_job_id}' not found"),
            })?;
        let record = entry.value_mut();
        let step_count = record.steps.len();
        let step = record
            .steps
            .get_mut(step_index)
            .ok_or_else(|| EngineError::Store {
                operation: "update_queue_step".to_string(),
                reason: format!(
                    "step index {step_index} out of bounds for queue job '{queue_job_id}' ({step_count} steps)"
                ),
            })?;

        let now = Utc::now();
        if let Some(status) = update.status {
            if status == JobStatus::Running && step.started_at.is_none() {
                step.started_at = Some(now);
            }
            if status.is_terminal() && step.completed_at.is_none() {
                step.completed_at = Some(now);
            }
            step.status = status;
        }
        update.output.apply(&mut step.output);
        update.error.apply(&mut step.error);

        record.status = record.derive_status();
        record.updated_at = now;
        Ok(())
    }
}
