//! # Dispatch Layer
//!
//! Sends single remote-capability invocations (agent calls, worker triggers,
//! nested workflow starts) and probes their status endpoints. The
//! [`Dispatcher`] trait is the seam: the engine talks to it, the HTTP client
//! implements it, and tests substitute in-process fakes.

pub mod client;
pub mod directory;
pub mod extraction;
pub mod pipeline;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::model::Message;
use crate::poller::Probe;
pub use client::HttpDispatchClient;
pub use directory::CapabilityDirectory;
pub use extraction::{ExtractionRule, ExtractionStrategy};
pub use pipeline::{PipelineRunner, PipelineWorker};

/// The three dispatchable capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    Agent,
    Worker,
    Workflow,
}

impl DispatchKind {
    /// URL path segment for this kind's status endpoint.
    pub fn status_segment(&self) -> &'static str {
        match self {
            DispatchKind::Agent => "agents",
            DispatchKind::Worker => "jobs",
            DispatchKind::Workflow => "runs",
        }
    }
}

impl std::fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchKind::Agent => write!(f, "agent"),
            DispatchKind::Worker => write!(f, "worker"),
            DispatchKind::Workflow => write!(f, "workflow"),
        }
    }
}

/// One capability invocation.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub kind: DispatchKind,
    pub capability: String,
    pub input: JsonValue,
    /// Conversation history forwarded to agents.
    pub messages: Option<Vec<Message>>,
    /// Caller-supplied job id; generated when absent so redelivery of the
    /// same logical dispatch stays idempotent.
    pub job_id: Option<String>,
    /// Whether the caller blocks on the response (agents only; workers are
    /// always fire-and-forget at the wire level).
    pub awaited: bool,
}

impl DispatchRequest {
    pub fn new(kind: DispatchKind, capability: impl Into<String>, input: JsonValue) -> Self {
        Self {
            kind,
            capability: capability.into(),
            input,
            messages: None,
            job_id: None,
            awaited: matches!(kind, DispatchKind::Agent | DispatchKind::Workflow),
        }
    }
}

/// Normalized dispatch result.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Blocking call finished; payload already extracted.
    Completed(JsonValue),
    /// Fire-and-forget accepted; the id addresses the job or nested run.
    Accepted { id: String, status: String },
}

/// Remote status endpoint payload: `GET` by run/job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub status: RemoteState,
    #[serde(default)]
    pub output: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Partial,
}

impl RemoteStatus {
    /// Collapse into a poller probe. `partial` is terminal and carries
    /// whatever output exists.
    pub fn to_probe(&self) -> Probe {
        match self.status {
            RemoteState::Completed | RemoteState::Partial => {
                Probe::Completed(self.output.clone().unwrap_or(JsonValue::Null))
            }
            RemoteState::Failed => Probe::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| "remote reported failure without detail".to_string()),
            ),
            RemoteState::Queued | RemoteState::Running | RemoteState::Paused => Probe::Pending,
        }
    }
}

/// A single remote-capability invocation endpoint plus its status probe.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Issue one invocation per the request's kind and await mode.
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome>;

    /// Query the status endpoint for a previously dispatched id.
    async fn probe(&self, kind: DispatchKind, id: &str) -> Result<RemoteStatus>;
}
