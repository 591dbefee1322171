//! # Status and Job Stores
//!
//! Persistence contracts that make execution resumable. Backends must provide
//! atomic read-then-merge-then-write upserts per record: the interpreter,
//! external worker callbacks, and pollers may all update the same record
//! concurrently, and last-writer-wins applies to individual fields, never to
//! whole records.

pub mod memory;
pub mod records;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
pub use memory::{InMemoryJobStore, InMemoryStatusStore};
pub use records::{
    JobRecord, JobStatus, JobUpdate, Patch, QueueJobRecord, QueueJobStatus, QueueJobStep,
    RunStatus, StatusUpdate, WorkflowStatusRecord,
};

/// Workflow status persistence. `set_status` is a merge-upsert: it creates
/// the record when absent and otherwise folds the update into it field-wise.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn set_status(&self, run_id: Uuid, update: StatusUpdate) -> Result<()>;

    async fn get_status(&self, run_id: Uuid) -> Result<Option<WorkflowStatusRecord>>;

    /// Look a run up by the caller-facing execution id, used before the run
    /// id is known to the outside.
    async fn run_id_by_execution_id(&self, execution_id: &str) -> Result<Option<Uuid>>;
}

/// Worker job persistence, including chained pipeline records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn set_job(&self, record: JobRecord) -> Result<()>;

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>>;

    /// Merge-update a job. Updates against a terminal job are discarded.
    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<()>;

    /// Attach a child dispatch to an existing job.
    async fn append_internal_job(&self, job_id: &str, child: JobRecord) -> Result<()>;

    async fn jobs_by_worker(&self, worker_id: &str) -> Result<Vec<JobRecord>>;

    async fn set_queue_job(&self, record: QueueJobRecord) -> Result<()>;

    async fn get_queue_job(&self, queue_job_id: &str) -> Result<Option<QueueJobRecord>>;

    /// Merge-update one pipeline step and re-derive the overall status.
    /// Transition timestamps are maintained by the store: entering `Running`
    /// stamps `started_at`, reaching a terminal state stamps `completed_at`.
    async fn update_queue_step(
        &self,
        queue_job_id: &str,
        step_index: usize,
        update: JobUpdate,
    ) -> Result<()>;
}
