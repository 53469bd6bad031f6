//! Error types for the syntegrity engine.
//!
//! Every failure the engine produces is an [`EngineError`]. Callers that need
//! to branch on the failure category use [`EngineError::kind`], which stays
//! stable even when an error has been wrapped with pipeline or step context.

use crate::cancellation::ContextError;
use crate::core::HookPhase;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The category of an engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty step name or otherwise unusable argument.
    InvalidArgument,
    /// Unknown step, pipeline, step result or hook.
    NotFound,
    /// A handler rejected its own configuration.
    ValidationFailed,
    /// A step depends on a step that is not registered.
    MissingDependency,
    /// The dependency graph contains a cycle.
    CircularDependency,
    /// A hook returned an error.
    HookFailed,
    /// Every attempt of a step body failed.
    StepFailed,
    /// Before hooks failed, the step body did not run.
    BeforeHooksFailed,
    /// After hooks failed following a successful step body.
    AfterHooksFailed,
    /// The context was cancelled or its deadline passed.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::ValidationFailed => "validation_failed",
            Self::MissingDependency => "missing_dependency",
            Self::CircularDependency => "circular_dependency",
            Self::HookFailed => "hook_failed",
            Self::StepFailed => "step_failed",
            Self::BeforeHooksFailed => "before_hooks_failed",
            Self::AfterHooksFailed => "after_hooks_failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The main error type for engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// An argument was rejected before any state was touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No step with this name is registered.
    #[error("step '{0}' not found")]
    StepNotFound(String),

    /// No status record exists for this pipeline.
    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    /// The pipeline exists but never attempted this step.
    #[error("step '{step}' not found in pipeline '{pipeline}'")]
    StepResultNotFound {
        /// The pipeline name.
        pipeline: String,
        /// The step name.
        step: String,
    },

    /// The hook to remove is not registered.
    #[error("hook not found for step '{step}' phase '{phase}'")]
    HookNotFound {
        /// The step name.
        step: String,
        /// The hook phase, if the lookup was phase-scoped.
        phase: String,
    },

    /// The handler rejected the configuration it described.
    #[error("step '{step}' validation failed: {message}")]
    ValidationFailed {
        /// The step name.
        step: String,
        /// The handler's rejection message.
        message: String,
    },

    /// A dependency is not registered.
    #[error("step '{step}' depends on unregistered step '{dependency}'")]
    MissingDependency {
        /// The dependent step.
        step: String,
        /// The missing dependency.
        dependency: String,
    },

    /// A cycle was found while ordering steps.
    #[error("circular dependency detected involving step '{step}'")]
    CircularDependency {
        /// A step on the cycle.
        step: String,
    },

    /// A hook returned an error.
    #[error("hook {ordinal} failed for step '{step}' phase '{phase}': {message}")]
    HookFailed {
        /// Zero-based registration index of the hook.
        ordinal: usize,
        /// The step name.
        step: String,
        /// The hook phase.
        phase: HookPhase,
        /// The hook's error.
        message: String,
    },

    /// All attempts of a step body failed.
    #[error("step '{step}' failed after {attempts} attempt(s): {message}")]
    StepFailed {
        /// The step name.
        step: String,
        /// Total attempts made.
        attempts: u32,
        /// The last attempt's error.
        message: String,
    },

    /// Before hooks failed; the step body was not invoked.
    #[error("before hooks failed for step '{step}': {source}")]
    BeforeHooksFailed {
        /// The step name.
        step: String,
        /// The hook failure.
        #[source]
        source: Box<EngineError>,
    },

    /// After hooks failed following a successful step body.
    #[error("after hooks failed for step '{step}': {source}")]
    AfterHooksFailed {
        /// The step name.
        step: String,
        /// The hook failure.
        #[source]
        source: Box<EngineError>,
    },

    /// The context was cancelled or timed out.
    #[error("{0}")]
    Cancelled(#[from] ContextError),

    /// The execution order for a pipeline could not be computed.
    #[error("failed to get execution order for pipeline '{pipeline}': {source}")]
    ExecutionOrder {
        /// The pipeline name.
        pipeline: String,
        /// The ordering failure.
        #[source]
        source: Box<EngineError>,
    },

    /// A step failed inside a pipeline.
    #[error("pipeline '{pipeline}' failed at step '{step}': {source}")]
    PipelineFailed {
        /// The pipeline name.
        pipeline: String,
        /// The failing step.
        step: String,
        /// The step failure.
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a validation failure for a step.
    #[must_use]
    pub fn validation_failed(step: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::ValidationFailed {
            step: step.into(),
            message: format!("{err:#}"),
        }
    }

    /// Returns the category of this error.
    ///
    /// Wrapping variants that only add pipeline context report the kind of
    /// the error they wrap.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::StepNotFound(_)
            | Self::PipelineNotFound(_)
            | Self::StepResultNotFound { .. }
            | Self::HookNotFound { .. } => ErrorKind::NotFound,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::CircularDependency { .. } => ErrorKind::CircularDependency,
            Self::HookFailed { .. } => ErrorKind::HookFailed,
            Self::StepFailed { .. } => ErrorKind::StepFailed,
            Self::BeforeHooksFailed { .. } => ErrorKind::BeforeHooksFailed,
            Self::AfterHooksFailed { .. } => ErrorKind::AfterHooksFailed,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::ExecutionOrder { source, .. } | Self::PipelineFailed { source, .. } => {
                source.kind()
            }
        }
    }

    /// Returns true if this error stems from context cancellation or timeout.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
