//! Hook-wrapped step execution.

use super::HookManager;
use crate::cancellation::StepContext;
use crate::core::HookPhase;
use crate::errors::{EngineError, EngineResult};
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// Runs a step body between its hook phases.
///
/// Before hooks gate the body. Success and error hooks are observational:
/// their failures are logged and dropped. After hooks run only when the body
/// succeeded and can still fail the step.
#[derive(Debug, Clone)]
pub struct HookExecutor {
    hooks: Arc<HookManager>,
}

impl HookExecutor {
    /// Creates an executor over a shared hook manager.
    #[must_use]
    pub fn new(hooks: Arc<HookManager>) -> Self {
        Self { hooks }
    }

    /// Returns the hook manager.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    /// Executes `body` wrapped in the hooks registered for `step_name`.
    ///
    /// # Errors
    ///
    /// Returns `BeforeHooksFailed` without running the body, the body's own
    /// error after the error hooks ran, or `AfterHooksFailed`.
    pub async fn execute_step_with_hooks<F, Fut>(
        &self,
        ctx: &StepContext,
        step_name: &str,
        body: F,
    ) -> EngineResult<()>
    where
        F: FnOnce(StepContext) -> Fut,
        Fut: Future<Output = EngineResult<()>>,
    {
        if let Err(err) = self
            .hooks
            .execute_hooks(ctx, step_name, HookPhase::Before)
            .await
        {
            error!(step = %step_name, error = %err, "Before hooks failed");
            return Err(EngineError::BeforeHooksFailed {
                step: step_name.to_string(),
                source: Box::new(err),
            });
        }

        match body(ctx.clone()).await {
            Ok(()) => {
                self.observe(ctx, step_name, HookPhase::Success).await;
                self.hooks
                    .execute_hooks(ctx, step_name, HookPhase::After)
                    .await
                    .map_err(|err| {
                        error!(step = %step_name, error = %err, "After hooks failed");
                        EngineError::AfterHooksFailed {
                            step: step_name.to_string(),
                            source: Box::new(err),
                        }
                    })
            }
            Err(step_err) => {
                self.observe(ctx, step_name, HookPhase::Error).await;
                Err(step_err)
            }
        }
    }

    async fn observe(&self, ctx: &StepContext, step_name: &str, phase: HookPhase) {
        if let Err(err) = self.hooks.execute_hooks(ctx, step_name, phase).await {
            error!(step = %step_name, phase = %phase, error = %err, "Hook failed");
        }
    }
}
