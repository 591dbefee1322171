//! Persistence record shapes and their lifecycle enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::interpreter::continuation::Checkpoint;

/// Workflow run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    /// Suspended on a hook token.
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {s}")),
        }
    }
}

/// Dispatched worker job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal jobs are immutable: further updates are discarded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Derived status of a chained worker pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    Running,
    Completed,
    Failed,
    /// Some steps completed before a later one failed.
    Partial,
}

impl QueueJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Partial)
    }
}

/// Per-run status record. Created at run start, mutated at every
/// pause/resume/terminal transition, never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatusRecord {
    pub run_id: Uuid,
    /// Secondary key for external lookup before the run id is known.
    pub execution_id: Option<String>,
    pub status: RunStatus,
    /// Set while paused on a hook; cleared on resume.
    pub hook_token: Option<String>,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub metadata: HashMap<String, JsonValue>,
    /// Continuation snapshot for resume-after-crash.
    pub checkpoint: Option<Checkpoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowStatusRecord {
    pub fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            execution_id: None,
            status: RunStatus::Pending,
            hook_token: None,
            result: None,
            error: None,
            metadata: HashMap::new(),
            checkpoint: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One dispatched worker invocation. Created `Queued` before the trigger
/// leaves the process; immutable once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub worker_id: String,
    pub status: JobStatus,
    pub input: JsonValue,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
    pub metadata: HashMap<String, JsonValue>,
    /// Child dispatches issued by the worker itself.
    #[serde(default)]
    pub internal_jobs: Vec<JobRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn queued(job_id: impl Into<String>, worker_id: impl Into<String>, input: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            worker_id: worker_id.into(),
            status: JobStatus::Queued,
            input,
            output: None,
            error: None,
            metadata: HashMap::new(),
            internal_jobs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One step of a chained pipeline, mirroring a job record's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJobStep {
    pub job_id: Option<String>,
    pub worker_id: String,
    pub status: JobStatus,
    pub input: Option<JsonValue>,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueJobStep {
    pub fn queued(worker_id: impl Into<String>) -> Self {
        Self {
            job_id: None,
            worker_id: worker_id.into(),
            status: JobStatus::Queued,
            input: None,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// One chained multi-worker pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJobRecord {
    pub queue_job_id: String,
    pub status: QueueJobStatus,
    pub steps: Vec<QueueJobStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueJobRecord {
    pub fn running(queue_job_id: impl Into<String>, steps: Vec<QueueJobStep>) -> Self {
        let now = Utc::now();
        Self {
            queue_job_id: queue_job_id.into(),
            status: QueueJobStatus::Running,
            steps,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the overall status from step outcomes: completed when every
    /// step completed, failed when nothing completed, partial otherwise.
    pub fn derive_status(&self) -> QueueJobStatus {
        let any_failed = self.steps.iter().any(|s| s.status == JobStatus::Failed);
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == JobStatus::Completed)
            .count();
        if !any_failed && completed == self.steps.len() {
            QueueJobStatus::Completed
        } else if any_failed && completed == 0 {
            QueueJobStatus::Failed
        } else if any_failed {
            QueueJobStatus::Partial
        } else {
            QueueJobStatus::Running
        }
    }
}

/// Field-wise patch for nullable record fields: leave as-is, set, or clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    /// Apply onto an optional field.
    pub fn apply(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Set(value) => *slot = Some(value),
            Patch::Clear => *slot = None,
        }
    }
}

/// Merge-update for a workflow status record. Unset fields keep their
/// current values; metadata entries merge key-wise.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<RunStatus>,
    pub execution_id: Option<String>,
    pub hook_token: Patch<String>,
    pub result: Patch<JsonValue>,
    pub error: Patch<String>,
    pub metadata: Option<HashMap<String, JsonValue>>,
    pub checkpoint: Patch<Checkpoint>,
}

impl StatusUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn paused_on(token: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Paused),
            hook_token: Patch::Set(token.into()),
            ..Self::default()
        }
    }

    pub fn resumed() -> Self {
        Self {
            status: Some(RunStatus::Running),
            hook_token: Patch::Clear,
            ..Self::default()
        }
    }

    pub fn completed(result: JsonValue) -> Self {
        Self {
            status: Some(RunStatus::Completed),
            result: Patch::Set(result),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            error: Patch::Set(error.into()),
            ..Self::default()
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Patch::Set(checkpoint);
        self
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}

/// Merge-update for a job record.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub output: Patch<JsonValue>,
    pub error: Patch<String>,
    pub metadata: Option<HashMap<String, JsonValue>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completed(output: JsonValue) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            output: Patch::Set(output),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Patch::Set(error.into()),
            ..Self::default()
        }
    }
}
