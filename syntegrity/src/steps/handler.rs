//! The step-handler contract.

use crate::cancellation::StepContext;
use crate::core::StepConfig;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;

/// Trait for the code behind a pipeline step.
///
/// The engine never looks inside a handler: it checks `can_handle` and
/// `validate` at registration, reads the declared config from `step_info`,
/// and calls `execute` once per attempt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Returns true if this handler can serve the named step.
    fn can_handle(&self, step_name: &str) -> bool;

    /// Runs one attempt of the step.
    ///
    /// Implementations should observe `ctx` and return promptly once it is
    /// done; the engine drops an attempt whose context finishes first.
    async fn execute(
        &self,
        ctx: &StepContext,
        step_name: &str,
        config: &StepConfig,
    ) -> anyhow::Result<()>;

    /// Returns the configuration this handler declares for the step.
    fn step_info(&self, step_name: &str) -> StepConfig;

    /// Checks a configuration before the step is registered.
    fn validate(&self, step_name: &str, config: &StepConfig) -> anyhow::Result<()>;
}

type StepFn = Box<dyn Fn(StepContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A handler built from a config and an async closure.
pub struct FnStepHandler {
    config: StepConfig,
    func: StepFn,
}

impl FnStepHandler {
    /// Creates a handler serving `config.name`.
    pub fn new<F, Fut>(config: StepConfig, func: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            config,
            func: Box::new(move |ctx| func(ctx).boxed()),
        }
    }

    /// Returns the declared config.
    #[must_use]
    pub fn config(&self) -> &StepConfig {
        &self.config
    }
}

impl std::fmt::Debug for FnStepHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStepHandler")
            .field("name", &self.config.name)
            .finish()
    }
}

#[async_trait]
impl StepHandler for FnStepHandler {
    fn can_handle(&self, step_name: &str) -> bool {
        self.config.name == step_name
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        _step_name: &str,
        _config: &StepConfig,
    ) -> anyhow::Result<()> {
        (self.func)(ctx.clone()).await
    }

    fn step_info(&self, _step_name: &str) -> StepConfig {
        self.config.clone()
    }

    fn validate(&self, step_name: &str, config: &StepConfig) -> anyhow::Result<()> {
        if config.name != step_name {
            anyhow::bail!(
                "config name '{}' does not match step '{}'",
                config.name,
                step_name
            );
        }
        if config.depends_on.iter().any(|dep| dep == step_name) {
            anyhow::bail!("step '{step_name}' cannot depend on itself");
        }
        Ok(())
    }
}
