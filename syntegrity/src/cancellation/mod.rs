//! Cooperative cancellation and shutdown utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation
//! - StepContext, the cancellation context passed to handlers and hooks
//! - ShutdownRegistry for LIFO resource closing

mod context;
mod shutdown;
mod token;

pub use context::{ContextError, StepContext, StepReport};
pub use shutdown::ShutdownRegistry;
pub use token::CancellationToken;
