//! Pipeline state and hook phase enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The lifecycle state of a pipeline status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Steps are executing.
    Running,
    /// Every step succeeded.
    Completed,
    /// A step, or execution planning, failed.
    Failed,
    /// Cancellation was observed.
    Cancelled,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl PipelineState {
    /// Returns true for completed, failed and cancelled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// The slot at which a hook fires relative to its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    /// Before the step body. Failure prevents the step.
    Before,
    /// After a successful step body. Failure fails the step.
    After,
    /// After a successful step body, before `After`. Observational.
    Success,
    /// After a failed step body. Observational.
    Error,
}

impl HookPhase {
    /// All phases in declaration order.
    pub const ALL: [Self; 4] = [Self::Before, Self::After, Self::Success, Self::Error];

    /// Returns the wire-level name of the phase.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown hook phase '{other}'")),
        }
    }
}
