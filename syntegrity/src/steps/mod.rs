//! Step handlers and the step registry.
//!
//! This module provides:
//! - The StepHandler contract and a closure-backed FnStepHandler
//! - StepRegistry with dependency validation and execution ordering
//! - RetryBackoff, the delay policy between attempts

mod handler;
mod ordering;
mod registry;
mod retry;

pub use handler::{FnStepHandler, StepHandler};
pub use ordering::{execution_order, validate_dependencies};
pub use registry::{StepInfo, StepRegistry};
pub use retry::{BackoffStrategy, JitterStrategy, RetryBackoff};
