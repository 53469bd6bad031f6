//! Step handlers that run real toolchains.
//!
//! This module provides:
//! - CommandStepHandler, which runs command lines for a set of steps
//! - CommandRunner, host or container execution
//! - The built-in Go steps

pub mod builtin;
mod command;

pub use builtin::{go_steps, register_go_steps};
pub use command::{
    parse_coverage, ArtifactSpec, CommandLine, CommandRunner, CommandStepHandler, StepDefinition,
};
