//! # Structured Logging Module
//!
//! Environment-aware structured logging for tracing long-running workflow
//! runs across their suspension points.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Console output is human-readable in development and JSON in production
/// (`STEPFLOW_ENV=production`). Safe to call more than once; if an embedder
/// already installed a global subscriber we keep theirs.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let json_output = environment == "production";

        let result = if json_output {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(EnvFilter::new(log_level)),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_ansi(true)
                        .with_filter(EnvFilter::new(log_level)),
                )
                .try_init()
        };

        if result.is_err() {
            // A global subscriber is already set by the host process.
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            json = json_output,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("STEPFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for run lifecycle transitions
pub fn log_run_transition(event: &str, run_id: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        event = %event,
        run_id = %run_id,
        status = %status,
        details = details,
        "📋 RUN_TRANSITION"
    );
}

/// Log structured data for step execution
pub fn log_step_operation(
    event: &str,
    run_id: &str,
    step_ref: &str,
    kind: &str,
    details: Option<&str>,
) {
    tracing::info!(
        event = %event,
        run_id = %run_id,
        step_ref = %step_ref,
        kind = %kind,
        details = details,
        "🔧 STEP_OPERATION"
    );
}
