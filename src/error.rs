//! Error types for the stepflow engine.

use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Validation problems are reported as a list by [`crate::validation::validate`]
/// and only become an `EngineError` when a caller attempts to execute a config
/// that failed pre-flight checks. Store failures are non-fatal for status
/// writes: the interpreter logs them and keeps going, so they surface here
/// only from operations where persistence is the point (job bookkeeping).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config validation failed: {reasons:?}")]
    Validation { reasons: Vec<String> },

    /// Network or HTTP failure calling a capability.
    #[error("Dispatch to '{capability}' failed: {reason}")]
    Dispatch {
        capability: String,
        reason: String,
        http_status: Option<u16>,
    },

    /// Bounded wait exceeded without reaching a terminal state.
    #[error("Poll timed out for {operation} after {waited_ms}ms ({attempts} attempts)")]
    PollTimeout {
        operation: String,
        waited_ms: u64,
        attempts: u32,
    },

    /// Event wait exceeded its configured duration.
    #[error("Hook '{token}' timed out after {waited_ms}ms")]
    HookTimeout { token: String, waited_ms: u64 },

    /// Config producer emitted a step or status this interpreter does not
    /// know. Always fatal: indicates a version mismatch.
    #[error("Unknown step type '{found}': config producer and interpreter disagree")]
    UnknownStepType { found: String },

    #[error("Store operation '{operation}' failed: {reason}")]
    Store { operation: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A nested step failed; carries the failing step's id or tree path.
    #[error("Step '{step_ref}' failed: {reason}")]
    StepFailed { step_ref: String, reason: String },
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
