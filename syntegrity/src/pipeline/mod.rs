//! Pipeline execution.
//!
//! This module provides:
//! - PipelineExecutor, which runs pipelines and single steps
//! - PipelineStatus, the per-pipeline status record
//! - Log rendering for status records
//! - PipelineCatalog and RunOptions for named pipelines

mod catalog;
mod executor;
mod integration_tests;
mod logs;
mod status;

pub use catalog::{PipelineCatalog, PipelineDefinition, RunOptions};
pub use executor::PipelineExecutor;
pub use logs::render_logs;
pub use status::PipelineStatus;
