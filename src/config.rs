use crate::constants::defaults;
use crate::error::{EngineError, Result};
use crate::poller::PollPolicy;

/// Engine-level configuration: dispatch transport settings and the last-resort
/// defaults for the poll and hook suspension points.
///
/// Per-run settings live on `OrchestrationConfig`; per-step overrides on the
/// steps themselves. This struct is the bottom of that chain.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,
    pub worker_poll: PollPolicy,
    pub hook_timeout_ms: u64,
}

/// Transport settings for the HTTP dispatch client.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Base URL the capability directory resolves relative identifiers against.
    pub base_url: String,
    /// Request timeout for a single dispatch call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: defaults::DISPATCH_TIMEOUT_MS,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            worker_poll: PollPolicy::default(),
            hook_timeout_ms: defaults::HOOK_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("STEPFLOW_BASE_URL") {
            config.dispatch.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("STEPFLOW_DISPATCH_TIMEOUT_MS") {
            config.dispatch.timeout_ms = timeout.parse().map_err(|e| {
                EngineError::Configuration(format!("Invalid dispatch timeout_ms: {e}"))
            })?;
        }

        if let Ok(interval) = std::env::var("STEPFLOW_POLL_INTERVAL_MS") {
            config.worker_poll.interval_ms = interval.parse().map_err(|e| {
                EngineError::Configuration(format!("Invalid poll interval_ms: {e}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("STEPFLOW_POLL_TIMEOUT_MS") {
            config.worker_poll.timeout_ms = timeout.parse().map_err(|e| {
                EngineError::Configuration(format!("Invalid poll timeout_ms: {e}"))
            })?;
        }

        if let Ok(retries) = std::env::var("STEPFLOW_POLL_MAX_RETRIES") {
            config.worker_poll.max_retries = retries.parse().map_err(|e| {
                EngineError::Configuration(format!("Invalid poll max_retries: {e}"))
            })?;
        }

        if let Ok(hook_timeout) = std::env::var("STEPFLOW_HOOK_TIMEOUT_MS") {
            config.hook_timeout_ms = hook_timeout.parse().map_err(|e| {
                EngineError::Configuration(format!("Invalid hook timeout_ms: {e}"))
            })?;
        }

        Ok(config)
    }
}
