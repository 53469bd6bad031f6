//! Observability utilities.
//!
//! Installs the process-wide `tracing` subscriber and builds the spans the
//! executor attaches to pipeline and step execution.

use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Log levels accepted by the configuration.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Installs a fmt subscriber filtered at `level`.
///
/// `RUST_LOG`, when set, takes precedence over `level`. Returns false if a
/// global subscriber was already installed.
pub fn init_tracing(level: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

/// Returns true if `level` is a known log level.
#[must_use]
pub fn is_valid_level(level: &str) -> bool {
    LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
}

/// Creates the span covering one pipeline execution.
#[must_use]
pub fn pipeline_span(pipeline_name: &str) -> Span {
    tracing::info_span!("pipeline", pipeline = %pipeline_name)
}

/// Creates the span covering one step inside a pipeline.
#[must_use]
pub fn step_span(pipeline_name: &str, step_name: &str) -> Span {
    tracing::info_span!("step", pipeline = %pipeline_name, step = %step_name)
}
