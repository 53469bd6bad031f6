//! Hooks attached to step phases.
//!
//! This module provides:
//! - Hook, an async callback over a step context
//! - HookManager, the (step, phase) registry
//! - HookExecutor, which wraps a step body in its hook phases

mod executor;
mod hook;
mod manager;

pub use executor::HookExecutor;
pub use hook::{Hook, HookId};
pub use manager::HookManager;
