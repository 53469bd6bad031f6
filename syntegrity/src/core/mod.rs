//! Core types for the syntegrity engine.
//!
//! This module contains the fundamental data types:
//! - StepConfig for handler-declared step settings
//! - StepResult and Artifact for execution outcomes
//! - PipelineState and HookPhase enums

mod config;
mod result;
mod status;

pub use config::StepConfig;
pub use result::{Artifact, StepResult};
pub use status::{HookPhase, PipelineState};
