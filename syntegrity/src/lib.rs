//! # Syntegrity
//!
//! A step-orchestration engine for CI/CD pipelines.
//!
//! Syntegrity composes named pipelines out of registered steps and runs them
//! with support for:
//!
//! - **Dynamic step registration**: Handlers declare their own config and dependencies
//! - **Dependency ordering**: Topological execution order with cycle detection
//! - **Hooks**: Before, success, error and after callbacks around every step
//! - **Retries and timeouts**: Per-step retry budget with cancellable backoff
//! - **Status tracking**: In-memory per-pipeline records and rendered logs
//! - **Cancellation**: Cooperative cancellation observed at step boundaries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use syntegrity::prelude::*;
//!
//! let registry = Arc::new(StepRegistry::new());
//! registry.register_step("build", Arc::new(FnStepHandler::new(
//!     StepConfig::new("build").with_retries(2),
//!     |ctx| async move { ctx.write_output("compiled"); Ok(()) },
//! )))?;
//!
//! let executor = PipelineExecutor::new(registry, Arc::new(HookManager::new()));
//! executor.execute_pipeline(&StepContext::new(), "ci", &[]).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod hooks;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod testing;

#[cfg(feature = "local")]
pub mod handlers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{
        CancellationToken, ContextError, ShutdownRegistry, StepContext,
    };
    pub use crate::config::{AppConfig, ConfigError};
    pub use crate::core::{Artifact, HookPhase, PipelineState, StepConfig, StepResult};
    pub use crate::errors::{EngineError, EngineResult, ErrorKind};
    pub use crate::hooks::{Hook, HookExecutor, HookId, HookManager};
    pub use crate::pipeline::{
        PipelineCatalog, PipelineDefinition, PipelineExecutor, PipelineStatus, RunOptions,
    };
    pub use crate::steps::{FnStepHandler, RetryBackoff, StepHandler, StepInfo, StepRegistry};
    pub use std::sync::Arc;
}
