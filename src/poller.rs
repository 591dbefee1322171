//! # Completion Poller
//!
//! A generic bounded retry loop for awaiting external jobs and nested runs.
//! The first probe fires immediately; subsequent probes run on a fixed
//! interval until a terminal state, the wall-clock budget, or the attempt
//! ceiling — whichever comes first. A timeout is a distinguished outcome,
//! not a failure: callers decide whether it means abandonment or escalation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::defaults;
use crate::error::{EngineError, Result};

/// Bounds for one completion poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_interval_ms() -> u64 {
    defaults::POLL_INTERVAL_MS
}

fn default_timeout_ms() -> u64 {
    defaults::POLL_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    defaults::POLL_MAX_RETRIES
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: defaults::POLL_INTERVAL_MS,
            timeout_ms: defaults::POLL_TIMEOUT_MS,
            max_retries: defaults::POLL_MAX_RETRIES,
        }
    }
}

/// What a single probe observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// Not terminal yet; keep polling.
    Pending,
    Completed(JsonValue),
    Failed(String),
}

/// Terminal result of a bounded poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(JsonValue),
    Failed(String),
    TimedOut { waited_ms: u64, attempts: u32 },
}

impl PollOutcome {
    /// Collapse into a `Result`, mapping a timeout to [`EngineError::PollTimeout`]
    /// and a remote failure to [`EngineError::StepFailed`].
    pub fn into_result(self, operation: &str) -> Result<JsonValue> {
        match self {
            PollOutcome::Completed(value) => Ok(value),
            PollOutcome::Failed(reason) => Err(EngineError::StepFailed {
                step_ref: operation.to_string(),
                reason,
            }),
            PollOutcome::TimedOut {
                waited_ms,
                attempts,
            } => Err(EngineError::PollTimeout {
                operation: operation.to_string(),
                waited_ms,
                attempts,
            }),
        }
    }
}

/// Poll `check` until it reports a terminal state or the policy's budget runs
/// out. A probe error is transient by definition (the status record may not
/// exist yet) and consumes the same budget as a pending probe.
pub async fn poll_until_done<F, Fut>(operation: &str, policy: &PollPolicy, mut check: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe>>,
{
    let started = Instant::now();
    let timeout = Duration::from_millis(policy.timeout_ms);
    let interval = Duration::from_millis(policy.interval_ms.max(1));
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match check().await {
            Ok(Probe::Completed(value)) => {
                debug!(operation = %operation, attempts, "poll reached completed state");
                return PollOutcome::Completed(value);
            }
            Ok(Probe::Failed(reason)) => {
                debug!(operation = %operation, attempts, reason = %reason, "poll reached failed state");
                return PollOutcome::Failed(reason);
            }
            Ok(Probe::Pending) => {}
            Err(e) => {
                // Not yet visible is not yet done.
                debug!(operation = %operation, attempts, error = %e, "transient probe failure");
            }
        }

        if started.elapsed() >= timeout || attempts >= policy.max_retries {
            let waited_ms = started.elapsed().as_millis() as u64;
            warn!(
                operation = %operation,
                attempts,
                waited_ms,
                "⏱️ poll budget exhausted without terminal state"
            );
            return PollOutcome::TimedOut {
                waited_ms,
                attempts,
            };
        }

        tokio::time::sleep(interval).await;

        if started.elapsed() >= timeout {
            let waited_ms = started.elapsed().as_millis() as u64;
            return PollOutcome::TimedOut {
                waited_ms,
                attempts,
            };
        }
    }
}
