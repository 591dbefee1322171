//! # Config Validator
//!
//! Pre-flight structural checks over a step tree. The walk is depth-first,
//! pure, and never short-circuits: every violation in the tree comes back in
//! one report so callers can fix them all at once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::model::{
    ConditionStep, DurationSpec, OrchestrationConfig, ParallelStep, Step, TokenSpec,
};

/// Machine-readable violation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    EmptySteps,
    DuplicateStepId,
    MissingCapability,
    WorkerAwaitWithoutPoll,
    MissingHookToken,
    InvalidDuration,
    EmptyBranch,
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::EmptySteps => "EMPTY_STEPS",
            Self::DuplicateStepId => "DUPLICATE_STEP_ID",
            Self::MissingCapability => "MISSING_CAPABILITY",
            Self::WorkerAwaitWithoutPoll => "WORKER_AWAIT_WITHOUT_POLL",
            Self::MissingHookToken => "MISSING_HOOK_TOKEN",
            Self::InvalidDuration => "INVALID_DURATION",
            Self::EmptyBranch => "EMPTY_BRANCH",
        };
        write!(f, "{code}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Execution is refused.
    Error,
    /// Reported but does not block execution. Hook tokens are the one case:
    /// token expressions may be reconstructed by the embedder after
    /// transport, so their absence at validation time is advisory.
    Warning,
}

/// One structural violation, located by tree path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationCode,
    pub severity: Severity,
    /// Tree path such as `steps[2].then[0]`.
    pub path: String,
    pub detail: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.path, self.detail)
    }
}

/// Validate a config. Returns every violation found; an empty list means the
/// tree is structurally sound. Pure: no side effects, no state.
pub fn validate(config: &OrchestrationConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen_ids: HashMap<String, String> = HashMap::new();

    if config.steps.is_empty() {
        errors.push(ValidationError {
            code: ValidationCode::EmptySteps,
            severity: Severity::Error,
            path: "steps".to_string(),
            detail: "root step sequence must not be empty".to_string(),
        });
    }

    if let Some(timeout) = &config.hook_timeout {
        check_duration(timeout, "hook_timeout", &mut errors);
    }

    walk(&config.steps, "steps", config, &mut seen_ids, &mut errors);
    errors
}

/// True when the report contains anything that blocks execution.
pub fn has_blocking_errors(errors: &[ValidationError]) -> bool {
    errors.iter().any(|e| e.severity == Severity::Error)
}

fn walk(
    steps: &[Step],
    prefix: &str,
    config: &OrchestrationConfig,
    seen_ids: &mut HashMap<String, String>,
    errors: &mut Vec<ValidationError>,
) {
    for (index, step) in steps.iter().enumerate() {
        let path = format!("{prefix}[{index}]");

        if let Some(id) = step.id() {
            if let Some(first_path) = seen_ids.get(id) {
                errors.push(ValidationError {
                    code: ValidationCode::DuplicateStepId,
                    severity: Severity::Error,
                    path: path.clone(),
                    detail: format!("step id '{id}' already used at {first_path}"),
                });
            } else {
                seen_ids.insert(id.to_string(), path.clone());
            }
        }

        match step {
            Step::Agent(agent) => {
                check_capability(&agent.agent, "agent", &path, errors);
            }
            Step::Worker(worker) => {
                check_capability(&worker.worker, "worker", &path, errors);
                let poll_supplied = worker.poll.is_some() || config.worker_poll.is_some();
                if worker.await_result && !poll_supplied {
                    errors.push(ValidationError {
                        code: ValidationCode::WorkerAwaitWithoutPoll,
                        severity: Severity::Error,
                        path: path.clone(),
                        detail: "awaited worker requires a bounded poll policy".to_string(),
                    });
                }
            }
            Step::Workflow(workflow) => {
                check_capability(&workflow.workflow, "workflow", &path, errors);
            }
            Step::Hook(hook) => {
                let token_supplied = match &hook.token {
                    Some(TokenSpec::Literal(token)) => !token.is_empty(),
                    Some(TokenSpec::Expr(_)) => true,
                    None => false,
                };
                if !token_supplied {
                    errors.push(ValidationError {
                        code: ValidationCode::MissingHookToken,
                        severity: Severity::Warning,
                        path: path.clone(),
                        detail: "hook has no resolvable token; it must be supplied before execution"
                            .to_string(),
                    });
                }
                if let Some(timeout) = &hook.timeout {
                    check_duration(timeout, &path, errors);
                }
            }
            Step::Sleep(sleep) => {
                check_duration(&sleep.duration, &path, errors);
            }
            Step::Condition(ConditionStep {
                then, otherwise, ..
            }) => {
                if then.is_empty() {
                    errors.push(ValidationError {
                        code: ValidationCode::EmptyBranch,
                        severity: Severity::Error,
                        path: format!("{path}.then"),
                        detail: "condition requires a non-empty then branch".to_string(),
                    });
                }
                walk(then, &format!("{path}.then"), config, seen_ids, errors);
                if let Some(otherwise) = otherwise {
                    walk(otherwise, &format!("{path}.else"), config, seen_ids, errors);
                }
            }
            Step::Parallel(ParallelStep { steps, .. }) => {
                if steps.is_empty() {
                    errors.push(ValidationError {
                        code: ValidationCode::EmptyBranch,
                        severity: Severity::Error,
                        path: path.clone(),
                        detail: "parallel requires a non-empty steps array".to_string(),
                    });
                }
                walk(steps, &format!("{path}.branch"), config, seen_ids, errors);
            }
        }
    }
}

fn check_capability(capability: &str, kind: &str, path: &str, errors: &mut Vec<ValidationError>) {
    if capability.trim().is_empty() {
        errors.push(ValidationError {
            code: ValidationCode::MissingCapability,
            severity: Severity::Error,
            path: path.to_string(),
            detail: format!("{kind} step requires a non-empty capability identifier"),
        });
    }
}

fn check_duration(duration: &DurationSpec, path: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = duration.to_duration() {
        errors.push(ValidationError {
            code: ValidationCode::InvalidDuration,
            severity: Severity::Error,
            path: path.to_string(),
            detail: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_from(value: serde_json::Value) -> OrchestrationConfig {
        serde_json::from_value(value).expect("config deserializes")
    }

    #[test]
    fn valid_config_yields_empty_report() {
        let config = config_from(json!({
            "steps": [
                {"type": "sleep", "duration": "10s"},
                {"type": "agent", "id": "a1", "agent": "/x"},
                {"type": "condition",
                 "if": {"step": "a1", "op": "exists"},
                 "then": [{"type": "worker", "id": "w1", "worker": "resize"}]}
            ]
        }));
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn duplicate_ids_reported_exactly_once() {
        let config = config_from(json!({
            "steps": [
                {"type": "agent", "id": "dup", "agent": "/a"},
                {"type": "parallel", "steps": [
                    {"type": "worker", "id": "dup", "worker": "resize"}
                ]}
            ]
        }));
        let errors = validate(&config);
        let duplicates: Vec<_> = errors
            .iter()
            .filter(|e| e.code == ValidationCode::DuplicateStepId)
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert!(duplicates[0].detail.contains("dup"));
    }

    #[test]
    fn empty_root_is_an_error() {
        let config = config_from(json!({"steps": []}));
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.code == ValidationCode::EmptySteps));
        assert!(has_blocking_errors(&errors));
    }

    #[test]
    fn awaited_worker_needs_poll_bounds() {
        let config = config_from(json!({
            "steps": [{"type": "worker", "worker": "resize", "await": true}]
        }));
        let errors = validate(&config);
        assert!(errors
            .iter()
            .any(|e| e.code == ValidationCode::WorkerAwaitWithoutPoll));

        // A config-level default poll policy satisfies the bound.
        let config = config_from(json!({
            "steps": [{"type": "worker", "worker": "resize", "await": true}],
            "worker_poll": {"interval_ms": 100, "timeout_ms": 300, "max_retries": 10}
        }));
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn missing_hook_token_is_a_warning_only() {
        let config = config_from(json!({
            "steps": [{"type": "hook"}]
        }));
        let errors = validate(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::MissingHookToken);
        assert_eq!(errors[0].severity, Severity::Warning);
        assert!(!has_blocking_errors(&errors));
    }

    #[test]
    fn empty_literal_hook_token_is_flagged() {
        let config = config_from(json!({
            "steps": [{"type": "hook", "token": ""}]
        }));
        let errors = validate(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::MissingHookToken);
        assert_eq!(errors[0].severity, Severity::Warning);
    }

    #[test]
    fn multibyte_duration_suffix_reports_invalid_duration() {
        let config = config_from(json!({
            "steps": [{"type": "sleep", "duration": "5µ"}]
        }));
        let errors = validate(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::InvalidDuration);
    }

    #[test]
    fn reports_all_violations_in_one_pass() {
        let config = config_from(json!({
            "steps": [
                {"type": "agent", "agent": ""},
                {"type": "sleep", "duration": "whenever"},
                {"type": "condition", "if": true, "then": []}
            ]
        }));
        let errors = validate(&config);
        let codes: Vec<_> = errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&ValidationCode::MissingCapability));
        assert!(codes.contains(&ValidationCode::InvalidDuration));
        assert!(codes.contains(&ValidationCode::EmptyBranch));
    }
}
