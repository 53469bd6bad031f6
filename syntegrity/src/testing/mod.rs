//! Testing utilities for syntegrity pipelines.
//!
//! This module provides mock step handlers and a shared call log.

mod mocks;

pub use mocks::{
    CallLog, FailingHandler, FlakyHandler, NoopHandler, RecordingHandler, SlowHandler,
};
