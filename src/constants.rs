//! # System Constants
//!
//! Lifecycle event names and operational defaults shared across the engine.
//! Defaults here are the last fallback in the override chain
//! (step-level -> orchestration config -> engine config -> constants).

/// Core lifecycle events emitted as structured log markers.
pub mod events {
    // Run lifecycle events
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_PAUSED: &str = "run.paused";
    pub const RUN_RESUMED: &str = "run.resumed";

    // Step lifecycle events
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_SKIPPED: &str = "step.skipped";

    // Dispatch lifecycle events
    pub const JOB_DISPATCHED: &str = "job.dispatched";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
}

/// Operational defaults for suspension points and dispatch.
pub mod defaults {
    /// Interval between completion-poll probes.
    pub const POLL_INTERVAL_MS: u64 = 1_000;
    /// Wall-clock budget for a completion poll.
    pub const POLL_TIMEOUT_MS: u64 = 120_000;
    /// Attempt ceiling for a completion poll.
    pub const POLL_MAX_RETRIES: u32 = 100;
    /// Hook waits default to a day; these are human-in-the-loop pauses.
    pub const HOOK_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1_000;
    /// HTTP timeout for a single dispatch call.
    pub const DISPATCH_TIMEOUT_MS: u64 = 30_000;
}
