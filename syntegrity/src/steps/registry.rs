//! Step registry: handlers, declared configs, ordering and retried execution.

use super::ordering::{execution_order, validate_dependencies};
use super::{RetryBackoff, StepHandler};
use crate::cancellation::StepContext;
use crate::core::StepConfig;
use crate::errors::{EngineError, EngineResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A registered step's declared config plus who depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// The declared config.
    #[serde(flatten)]
    pub config: StepConfig,
    /// Registered steps that list this step in `depends_on`, sorted.
    pub dependents: Vec<String>,
}

struct RegisteredStep {
    handler: Arc<dyn StepHandler>,
    config: StepConfig,
}

/// Registry of step handlers and their declared configs.
///
/// Reads and writes are serialized by a reader/writer lock; handler bodies
/// always run with the lock released.
#[derive(Default)]
pub struct StepRegistry {
    steps: RwLock<BTreeMap<String, RegisteredStep>>,
    backoff: RetryBackoff,
}

impl StepRegistry {
    /// Creates an empty registry with the default linear backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backoff used between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the backoff used between attempts.
    #[must_use]
    pub fn backoff(&self) -> &RetryBackoff {
        &self.backoff
    }

    /// Registers `handler` under `name`, replacing any previous registration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty name or a handler that cannot
    /// serve `name`, and `ValidationFailed` if the handler rejects its own
    /// declared config.
    pub fn register_step(&self, name: &str, handler: Arc<dyn StepHandler>) -> EngineResult<()> {
        if name.trim().is_empty() {
            return Err(EngineError::invalid_argument("step name cannot be empty"));
        }
        if !handler.can_handle(name) {
            return Err(EngineError::invalid_argument(format!(
                "handler cannot handle step '{name}'"
            )));
        }

        let config = handler.step_info(name);
        handler
            .validate(name, &config)
            .map_err(|e| EngineError::validation_failed(name, &e))?;

        let replaced = self
            .steps
            .write()
            .insert(name.to_string(), RegisteredStep { handler, config })
            .is_some();
        debug!(step = %name, replaced, "Registered step");
        Ok(())
    }

    /// Removes a step.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the step is not registered.
    pub fn unregister_step(&self, name: &str) -> EngineResult<()> {
        self.steps
            .write()
            .remove(name)
            .map(|_| debug!(step = %name, "Unregistered step"))
            .ok_or_else(|| EngineError::StepNotFound(name.to_string()))
    }

    /// Removes every step.
    pub fn clear_all_steps(&self) {
        self.steps.write().clear();
    }

    /// Returns the handler registered for a step.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the step is not registered.
    pub fn get_step_handler(&self, name: &str) -> EngineResult<Arc<dyn StepHandler>> {
        self.steps
            .read()
            .get(name)
            .map(|step| step.handler.clone())
            .ok_or_else(|| EngineError::StepNotFound(name.to_string()))
    }

    /// Returns the config declared at registration.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the step is not registered.
    pub fn get_step_config(&self, name: &str) -> EngineResult<StepConfig> {
        self.steps
            .read()
            .get(name)
            .map(|step| step.config.clone())
            .ok_or_else(|| EngineError::StepNotFound(name.to_string()))
    }

    /// Returns the config together with the step's dependents.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the step is not registered.
    pub fn get_step_info(&self, name: &str) -> EngineResult<StepInfo> {
        let steps = self.steps.read();
        let step = steps
            .get(name)
            .ok_or_else(|| EngineError::StepNotFound(name.to_string()))?;
        let dependents = steps
            .iter()
            .filter(|(_, other)| other.config.depends_on.iter().any(|dep| dep == name))
            .map(|(other_name, _)| other_name.clone())
            .collect();

        Ok(StepInfo {
            config: step.config.clone(),
            dependents,
        })
    }

    /// Lists every registered step name, sorted.
    #[must_use]
    pub fn list_steps(&self) -> Vec<String> {
        self.steps.read().keys().cloned().collect()
    }

    /// Lists steps declared as required.
    #[must_use]
    pub fn get_required_steps(&self) -> Vec<String> {
        self.filter_names(|config| config.required)
    }

    /// Lists steps not declared as required.
    #[must_use]
    pub fn get_optional_steps(&self) -> Vec<String> {
        self.filter_names(|config| !config.required)
    }

    /// Lists steps declared as parallelizable.
    #[must_use]
    pub fn get_parallel_steps(&self) -> Vec<String> {
        self.filter_names(|config| config.parallel)
    }

    /// Returns the number of registered steps.
    #[must_use]
    pub fn get_step_count(&self) -> usize {
        self.steps.read().len()
    }

    /// Checks that every dependency of every step is registered.
    ///
    /// # Errors
    ///
    /// Returns `MissingDependency` naming the step and the missing name.
    pub fn validate_dependencies(&self) -> EngineResult<()> {
        validate_dependencies(&self.config_snapshot())
    }

    /// Returns all registered steps with dependencies before dependents.
    ///
    /// # Errors
    ///
    /// Returns `MissingDependency` or `CircularDependency`.
    pub fn get_execution_order(&self) -> EngineResult<Vec<String>> {
        let configs = self.config_snapshot();
        validate_dependencies(&configs)?;
        execution_order(&configs)
    }

    /// Executes a step with its declared timeout and retry policy.
    ///
    /// Makes up to `retries + 1` attempts, waiting the backoff delay between
    /// them. The timeout, when set, bounds all attempts together.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown step, `Cancelled` if the context is
    /// cancelled or times out, and `StepFailed` wrapping the last attempt's
    /// error once every attempt failed.
    pub async fn execute_step(&self, ctx: &StepContext, name: &str) -> EngineResult<()> {
        let (handler, config) = {
            let steps = self.steps.read();
            let step = steps
                .get(name)
                .ok_or_else(|| EngineError::StepNotFound(name.to_string()))?;
            (step.handler.clone(), step.config.clone())
        };

        let step_ctx = match config.effective_timeout() {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        };

        let max_attempts = config.max_attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.backoff.delay(attempt - 1);
                debug!(
                    step = %name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Waiting before retry"
                );
                step_ctx.sleep(delay).await?;
            }

            match step_ctx.run(handler.execute(&step_ctx, name, &config)).await {
                Ok(Ok(())) => {
                    if attempt > 1 {
                        info!(step = %name, attempt, "Step succeeded after retry");
                    }
                    return Ok(());
                }
                Ok(Err(err)) => {
                    if let Some(ctx_err) = step_ctx.err() {
                        return Err(ctx_err.into());
                    }
                    warn!(
                        step = %name,
                        attempt,
                        max_attempts,
                        error = %format!("{err:#}"),
                        "Step attempt failed"
                    );
                    last_error = Some(err);
                }
                Err(ctx_err) => return Err(ctx_err.into()),
            }
        }

        Err(EngineError::StepFailed {
            step: name.to_string(),
            attempts: max_attempts,
            message: last_error
                .map(|err| format!("{err:#}"))
                .unwrap_or_default(),
        })
    }

    fn config_snapshot(&self) -> BTreeMap<String, StepConfig> {
        self.steps
            .read()
            .iter()
            .map(|(name, step)| (name.clone(), step.config.clone()))
            .collect()
    }

    fn filter_names(&self, predicate: impl Fn(&StepConfig) -> bool) -> Vec<String> {
        self.steps
            .read()
            .iter()
            .filter(|(_, step)| predicate(&step.config))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.list_steps())
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::steps::handler::MockStepHandler;
    use crate::steps::FnStepHandler;
    use crate::testing::{FlakyHandler, NoopHandler, SlowHandler};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::Instant;

    fn noop(config: StepConfig) -> Arc<dyn StepHandler> {
        Arc::new(NoopHandler::new(config))
    }

    #[test]
    fn test_register_and_get_config() {
        let registry = StepRegistry::new();
        let config = StepConfig::new("build")
            .with_description("Compile")
            .required()
            .with_metadata("lang", serde_json::json!("go"));

        registry.register_step("build", noop(config.clone())).unwrap();

        assert_eq!(registry.get_step_config("build").unwrap(), config);
        assert_eq!(registry.list_steps(), vec!["build".to_string()]);
        assert_eq!(registry.get_step_count(), 1);
        assert!(registry.get_step_handler("build").is_ok());
    }

    #[test]
    fn test_register_rejects_empty_name() {
        let registry = StepRegistry::new();
        let err = registry
            .register_step("", noop(StepConfig::new("")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_register_rejects_unhandled_name() {
        let registry = StepRegistry::new();
        let err = registry
            .register_step("test", noop(StepConfig::new("build")))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(registry.get_step_count(), 0);
    }

    #[test]
    fn test_register_rejects_failed_validation() {
        let mut handler = MockStepHandler::new();
        handler.expect_can_handle().returning(|_| true);
        handler
            .expect_step_info()
            .returning(|name| StepConfig::new(name));
        handler
            .expect_validate()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("image is required")));

        let registry = StepRegistry::new();
        let err = registry.register_step("push", Arc::new(handler)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(err.to_string().contains("image is required"));
        assert!(registry.get_step_config("push").is_err());
    }

    #[test]
    fn test_lookup_unknown_step() {
        let registry = StepRegistry::new();
        assert_eq!(
            registry.get_step_config("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            registry.get_step_info("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            registry.unregister_step("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_projections() {
        let registry = StepRegistry::new();
        registry
            .register_step("setup", noop(StepConfig::new("setup").required()))
            .unwrap();
        registry
            .register_step(
                "lint",
                noop(StepConfig::new("lint").parallel().depends_on(["setup"])),
            )
            .unwrap();
        registry
            .register_step("test", noop(StepConfig::new("test").required().depends_on(["setup"])))
            .unwrap();

        assert_eq!(registry.get_required_steps(), vec!["setup", "test"]);
        assert_eq!(registry.get_optional_steps(), vec!["lint"]);
        assert_eq!(registry.get_parallel_steps(), vec!["lint"]);

        let info = registry.get_step_info("setup").unwrap();
        assert_eq!(info.dependents, vec!["lint", "test"]);

        registry.unregister_step("lint").unwrap();
        assert_eq!(registry.get_step_count(), 2);
        registry.clear_all_steps();
        assert_eq!(registry.get_step_count(), 0);
    }

    #[test]
    fn test_execution_order_validates_dependencies() {
        let registry = StepRegistry::new();
        registry
            .register_step("build", noop(StepConfig::new("build").depends_on(["setup"])))
            .unwrap();

        assert_eq!(
            registry.validate_dependencies().unwrap_err().kind(),
            ErrorKind::MissingDependency
        );
        assert_eq!(
            registry.get_execution_order().unwrap_err().kind(),
            ErrorKind::MissingDependency
        );

        registry.register_step("setup", noop(StepConfig::new("setup"))).unwrap();
        assert_eq!(registry.get_execution_order().unwrap(), vec!["setup", "build"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_step_retries_until_success() {
        let flaky = Arc::new(FlakyHandler::new(StepConfig::new("r").with_retries(2), 2));
        let registry = StepRegistry::new();
        registry.register_step("r", flaky.clone()).unwrap();

        let start = Instant::now();
        registry.execute_step(&StepContext::new(), "r").await.unwrap();

        assert_eq!(flaky.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_step_exhausts_attempts() {
        let flaky = Arc::new(FlakyHandler::new(StepConfig::new("r").with_retries(1), 10));
        let registry = StepRegistry::new();
        registry.register_step("r", flaky.clone()).unwrap();

        let err = registry
            .execute_step(&StepContext::new(), "r")
            .await
            .unwrap_err();

        assert_eq!(flaky.calls(), 2);
        assert_eq!(err.kind(), ErrorKind::StepFailed);
        let message = err.to_string();
        assert!(message.contains("after 2 attempt(s)"));
        assert!(message.contains("attempt 2 failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_step_timeout_surfaces_context_error() {
        let config = StepConfig::new("slow")
            .with_timeout(Duration::from_millis(50))
            .with_retries(3);
        let slow = Arc::new(SlowHandler::new(config, Duration::from_secs(10)));
        let registry = StepRegistry::new();
        registry.register_step("slow", slow.clone()).unwrap();

        let err = registry
            .execute_step(&StepContext::new(), "slow")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.to_string(), "context deadline exceeded");
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_aborts_when_cancelled() {
        let flaky = Arc::new(FlakyHandler::new(StepConfig::new("r").with_retries(5), 10));
        let registry = StepRegistry::new();
        registry.register_step("r", flaky.clone()).unwrap();

        let ctx = StepContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel("user abort");
        });

        let err = registry.execute_step(&ctx, "r").await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn test_custom_backoff_is_used() {
        let registry = StepRegistry::new().with_backoff(
            RetryBackoff::new().with_base_delay(Duration::from_millis(1)),
        );
        let flaky = Arc::new(FlakyHandler::new(StepConfig::new("r").with_retries(1), 1));
        registry.register_step("r", flaky.clone()).unwrap();

        registry.execute_step(&StepContext::new(), "r").await.unwrap();
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn test_execute_unknown_step() {
        let registry = StepRegistry::new();
        let err = registry
            .execute_step(&StepContext::new(), "ghost")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fn_handler_registration_round_trip() {
        let registry = StepRegistry::new();
        let config = StepConfig::new("tag").depends_on(["test"]);
        registry
            .register_step(
                "tag",
                Arc::new(FnStepHandler::new(config.clone(), |_ctx| async { Ok(()) })),
            )
            .unwrap();

        assert_eq!(registry.get_step_config("tag").unwrap(), config);
    }
}
