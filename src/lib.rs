#![allow(clippy::doc_markdown)] // Allow technical terms like JavaScript, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Stepflow Core
//!
//! A durable workflow orchestration engine: a declarative step tree in, remote
//! capability dispatches out, with explicit suspension points and resumable
//! state throughout.
//!
//! ## Overview
//!
//! Workflow configs are plain serde data (see [`model`]): seven step types
//! covering agent calls, background workers, nested workflows, event hooks,
//! timed sleeps, conditionals, and parallel fan-out. Because the tree and the
//! execution context both survive serialization, a run can be checkpointed
//! after every settled step and resumed later without repeating remote work.
//!
//! ## Architecture
//!
//! The engine is a small set of explicit seams:
//!
//! - [`model`] - Serde data model for step trees and orchestration configs
//! - [`validation`] - Pre-flight structural checks with machine-readable codes
//! - [`resolver`] - Pure input resolution from the execution context
//! - [`interpreter`] - The step walker, checkpointing, and resume
//! - [`dispatch`] - Remote capability invocation behind the `Dispatcher` trait
//! - [`poller`] - Bounded completion polling for fire-and-forget dispatches
//! - [`stores`] - Status and job persistence contracts plus in-memory backends
//! - [`host`] - Event-wait and timer primitives supplied by the host substrate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use stepflow_core::config::EngineConfig;
//! use stepflow_core::dispatch::HttpDispatchClient;
//! use stepflow_core::host::{InMemoryEventHub, TokioClock};
//! use stepflow_core::interpreter::StepInterpreter;
//! use stepflow_core::model::OrchestrationConfig;
//! use stepflow_core::stores::{InMemoryJobStore, InMemoryStatusStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = EngineConfig::from_env()?;
//! let job_store = Arc::new(InMemoryJobStore::new());
//! let dispatcher = Arc::new(HttpDispatchClient::new(&engine.dispatch, job_store.clone())?);
//!
//! let interpreter = StepInterpreter::new(
//!     dispatcher,
//!     Arc::new(InMemoryStatusStore::new()),
//!     job_store,
//!     Arc::new(InMemoryEventHub::new()),
//!     Arc::new(TokioClock),
//!     engine,
//! );
//!
//! let config: OrchestrationConfig = serde_json::from_value(json!({
//!     "steps": [
//!         {"type": "agent", "id": "summarize", "agent": "/summarize"},
//!         {"type": "worker", "id": "publish", "worker": "publish"}
//!     ],
//!     "input": {"doc": "readme"}
//! }))?;
//!
//! let outcome = interpreter.execute(&config).await?;
//! println!("run {} finished: {}", outcome.run_id, outcome.result);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod logging;
pub mod model;
pub mod poller;
pub mod resolver;
pub mod stores;
pub mod validation;

pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use error::{EngineError, Result};
pub use interpreter::{RunOutcome, StepInterpreter};
pub use model::{OrchestrationConfig, Step};
pub use validation::{validate, ValidationError};
