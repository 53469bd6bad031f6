//! Mock step handlers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::StepContext;
use crate::core::StepConfig;
use crate::steps::StepHandler;

/// A shared, ordered record of step invocations.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of every entry in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// A handler that always succeeds and counts its calls.
#[derive(Debug)]
pub struct NoopHandler {
    config: StepConfig,
    calls: AtomicUsize,
}

impl NoopHandler {
    /// Creates a no-op handler declaring `config`.
    #[must_use]
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a no-op handler for `name` with a default config.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(StepConfig::new(name))
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepHandler for NoopHandler {
    fn can_handle(&self, step_name: &str) -> bool {
        self.config.name == step_name
    }

    async fn execute(
        &self,
        _ctx: &StepContext,
        _step_name: &str,
        _config: &StepConfig,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn step_info(&self, _step_name: &str) -> StepConfig {
        self.config.clone()
    }

    fn validate(&self, _step_name: &str, _config: &StepConfig) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A handler that appends the step name to a shared [`CallLog`].
#[derive(Debug)]
pub struct RecordingHandler {
    config: StepConfig,
    log: CallLog,
}

impl RecordingHandler {
    /// Creates a recording handler.
    #[must_use]
    pub fn new(config: StepConfig, log: CallLog) -> Self {
        Self { config, log }
    }
}

#[async_trait]
impl StepHandler for RecordingHandler {
    fn can_handle(&self, step_name: &str) -> bool {
        self.config.name == step_name
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        step_name: &str,
        _config: &StepConfig,
    ) -> anyhow::Result<()> {
        self.log.push(step_name);
        ctx.write_output(&format!("{step_name} done"));
        Ok(())
    }

    fn step_info(&self, _step_name: &str) -> StepConfig {
        self.config.clone()
    }

    fn validate(&self, _step_name: &str, _config: &StepConfig) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A handler that fails a fixed number of times and then succeeds.
#[derive(Debug)]
pub struct FlakyHandler {
    config: StepConfig,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyHandler {
    /// Creates a handler whose first `failures` calls fail.
    #[must_use]
    pub fn new(config: StepConfig, failures: usize) -> Self {
        Self {
            config,
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepHandler for FlakyHandler {
    fn can_handle(&self, step_name: &str) -> bool {
        self.config.name == step_name
    }

    async fn execute(
        &self,
        _ctx: &StepContext,
        _step_name: &str,
        _config: &StepConfig,
    ) -> anyhow::Result<()> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            anyhow::bail!("attempt {attempt} failed");
        }
        Ok(())
    }

    fn step_info(&self, _step_name: &str) -> StepConfig {
        self.config.clone()
    }

    fn validate(&self, _step_name: &str, _config: &StepConfig) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A handler that always fails with the same message.
#[derive(Debug)]
pub struct FailingHandler {
    config: StepConfig,
    error: String,
    calls: AtomicUsize,
}

impl FailingHandler {
    /// Creates a failing handler.
    #[must_use]
    pub fn new(config: StepConfig, error: impl Into<String>) -> Self {
        Self {
            config,
            error: error.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepHandler for FailingHandler {
    fn can_handle(&self, step_name: &str) -> bool {
        self.config.name == step_name
    }

    async fn execute(
        &self,
        _ctx: &StepContext,
        _step_name: &str,
        _config: &StepConfig,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!(self.error.clone()))
    }

    fn step_info(&self, _step_name: &str) -> StepConfig {
        self.config.clone()
    }

    fn validate(&self, _step_name: &str, _config: &StepConfig) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A handler that sleeps on its context before succeeding.
#[derive(Debug)]
pub struct SlowHandler {
    config: StepConfig,
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowHandler {
    /// Creates a slow handler.
    #[must_use]
    pub fn new(config: StepConfig, delay: Duration) -> Self {
        Self {
            config,
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a slow handler with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(config: StepConfig, ms: u64) -> Self {
        Self::new(config, Duration::from_millis(ms))
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepHandler for SlowHandler {
    fn can_handle(&self, step_name: &str) -> bool {
        self.config.name == step_name
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        _step_name: &str,
        _config: &StepConfig,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.sleep(self.delay).await?;
        Ok(())
    }

    fn step_info(&self, _step_name: &str) -> StepConfig {
        self.config.clone()
    }

    fn validate(&self, _step_name: &str, _config: &StepConfig) -> anyhow::Result<()> {
        Ok(())
    }
}
