//! Pipeline execution and the pipeline status store.

use super::logs::render_logs;
use super::PipelineStatus;
use crate::cancellation::{ContextError, StepContext};
use crate::core::{PipelineState, StepResult};
use crate::errors::{EngineError, EngineResult};
use crate::hooks::{HookExecutor, HookManager};
use crate::observability::{pipeline_span, step_span};
use crate::steps::StepRegistry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn, Instrument};

type StatusRecord = Arc<RwLock<PipelineStatus>>;

/// Runs pipelines over a shared step registry and hook manager.
///
/// The executor owns the status store. Each record has its own lock, so
/// pipelines running concurrently from separate callers update their
/// records independently. Within one pipeline, steps run strictly one after
/// another.
pub struct PipelineExecutor {
    registry: Arc<StepRegistry>,
    hook_executor: HookExecutor,
    statuses: RwLock<HashMap<String, StatusRecord>>,
}

impl PipelineExecutor {
    /// Creates an executor with an empty status store.
    #[must_use]
    pub fn new(registry: Arc<StepRegistry>, hooks: Arc<HookManager>) -> Self {
        Self {
            registry,
            hook_executor: HookExecutor::new(hooks),
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the step registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// Returns the hook manager.
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookManager> {
        self.hook_executor.hooks()
    }

    /// Executes a pipeline, replacing any previous record of the same name.
    ///
    /// With an empty `steps` list the registry's execution order is used.
    /// An explicit list runs as given, without dependency checks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty pipeline name, `ExecutionOrder`
    /// if planning fails, `Cancelled` if the context is done at a step
    /// boundary or the record was cancelled with [`Self::cancel_pipeline`],
    /// and `PipelineFailed` naming the step that failed.
    pub async fn execute_pipeline(
        &self,
        ctx: &StepContext,
        pipeline_name: &str,
        steps: &[String],
    ) -> EngineResult<()> {
        if pipeline_name.trim().is_empty() {
            return Err(EngineError::invalid_argument("pipeline name cannot be empty"));
        }

        self.run_pipeline(ctx, pipeline_name, steps)
            .instrument(pipeline_span(pipeline_name))
            .await
    }

    async fn run_pipeline(
        &self,
        ctx: &StepContext,
        pipeline_name: &str,
        steps: &[String],
    ) -> EngineResult<()> {
        let record: StatusRecord = Arc::new(RwLock::new(PipelineStatus::running(pipeline_name)));
        self.statuses
            .write()
            .insert(pipeline_name.to_string(), record.clone());

        let order = if steps.is_empty() {
            match self.registry.get_execution_order() {
                Ok(order) => order,
                Err(err) => {
                    record.write().finish(PipelineState::Failed);
                    error!(pipeline = %pipeline_name, error = %err, "Failed to plan pipeline");
                    return Err(EngineError::ExecutionOrder {
                        pipeline: pipeline_name.to_string(),
                        source: Box::new(err),
                    });
                }
            }
        } else {
            steps.to_vec()
        };

        info!(pipeline = %pipeline_name, steps = order.len(), "Starting pipeline execution");

        for step_name in &order {
            if let Some(ctx_err) = ctx.err() {
                record.write().finish(PipelineState::Cancelled);
                warn!(pipeline = %pipeline_name, step = %step_name, "Pipeline cancelled");
                return Err(ctx_err.into());
            }
            if record.read().is_terminal() {
                warn!(pipeline = %pipeline_name, step = %step_name, "Pipeline cancelled");
                return Err(cancelled_by_caller(pipeline_name));
            }

            let (result, outcome) = self.run_step(ctx, pipeline_name, step_name).await;
            record.write().record_step(result);

            if let Err(err) = outcome {
                let state = if ctx.is_done() {
                    PipelineState::Cancelled
                } else {
                    PipelineState::Failed
                };
                if !record.write().finish(state) {
                    warn!(pipeline = %pipeline_name, step = %step_name, "Pipeline cancelled");
                    return Err(cancelled_by_caller(pipeline_name));
                }
                error!(
                    pipeline = %pipeline_name,
                    step = %step_name,
                    status = %state,
                    "Pipeline stopped"
                );
                return Err(EngineError::PipelineFailed {
                    pipeline: pipeline_name.to_string(),
                    step: step_name.clone(),
                    source: Box::new(err),
                });
            }
        }

        // A record cancelled during the last step stays cancelled.
        if !record.write().finish(PipelineState::Completed) {
            warn!(pipeline = %pipeline_name, "Pipeline cancelled");
            return Err(cancelled_by_caller(pipeline_name));
        }
        info!(pipeline = %pipeline_name, "Pipeline completed");
        Ok(())
    }

    /// Executes one step under a pipeline record.
    ///
    /// Creates a `running` record when none exists. The record is never
    /// moved to a terminal state here.
    ///
    /// # Errors
    ///
    /// Returns the step's error after it has been recorded.
    pub async fn execute_step(
        &self,
        ctx: &StepContext,
        pipeline_name: &str,
        step_name: &str,
    ) -> EngineResult<()> {
        if pipeline_name.trim().is_empty() {
            return Err(EngineError::invalid_argument("pipeline name cannot be empty"));
        }

        let record = self
            .statuses
            .write()
            .entry(pipeline_name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(PipelineStatus::running(pipeline_name))))
            .clone();

        let (result, outcome) = self.run_step(ctx, pipeline_name, step_name).await;
        record.write().record_step(result);
        outcome
    }

    async fn run_step(
        &self,
        ctx: &StepContext,
        pipeline_name: &str,
        step_name: &str,
    ) -> (StepResult, EngineResult<()>) {
        let start = Instant::now();

        let config = match self.registry.get_step_config(step_name) {
            Ok(config) => config,
            Err(err) => {
                error!(
                    pipeline = %pipeline_name,
                    step = %step_name,
                    error = %err,
                    "Step lookup failed"
                );
                return (
                    StepResult::failure(step_name, start.elapsed(), err.to_string()),
                    Err(err),
                );
            }
        };

        let step_ctx = match config.effective_timeout() {
            Some(timeout) => ctx.for_step().with_timeout(timeout),
            None => ctx.for_step(),
        };

        info!(pipeline = %pipeline_name, step = %step_name, "Executing step");
        let registry = &self.registry;
        let outcome = self
            .hook_executor
            .execute_step_with_hooks(&step_ctx, step_name, |body_ctx| async move {
                registry.execute_step(&body_ctx, step_name).await
            })
            .instrument(step_span(pipeline_name, step_name))
            .await;

        let duration = start.elapsed();
        let report = step_ctx.take_report();
        let result = match &outcome {
            Ok(()) => {
                info!(
                    pipeline = %pipeline_name,
                    step = %step_name,
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "Step completed"
                );
                StepResult::success(step_name, duration)
            }
            Err(err) => {
                error!(pipeline = %pipeline_name, step = %step_name, error = %err, "Step failed");
                StepResult::failure(step_name, duration, err.to_string())
            }
        }
        .with_metadata(config.metadata)
        .with_report(report.output, report.artifacts);

        (result, outcome)
    }

    /// Returns a snapshot of a pipeline's record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the pipeline has no record.
    pub fn get_pipeline_status(&self, pipeline_name: &str) -> EngineResult<PipelineStatus> {
        self.record(pipeline_name).map(|record| record.read().clone())
    }

    /// Returns one step's result within a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown pipeline or a step never attempted.
    pub fn get_step_status(
        &self,
        pipeline_name: &str,
        step_name: &str,
    ) -> EngineResult<StepResult> {
        let record = self.record(pipeline_name)?;
        let status = record.read();
        status
            .steps
            .get(step_name)
            .cloned()
            .ok_or_else(|| EngineError::StepResultNotFound {
                pipeline: pipeline_name.to_string(),
                step: step_name.to_string(),
            })
    }

    /// Renders a pipeline's record as human-readable lines.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the pipeline has no record.
    pub fn get_pipeline_logs(&self, pipeline_name: &str) -> EngineResult<Vec<String>> {
        self.record(pipeline_name)
            .map(|record| render_logs(&record.read()))
    }

    /// Lists every pipeline with a record, sorted.
    #[must_use]
    pub fn list_pipelines(&self) -> Vec<String> {
        let mut names: Vec<String> = self.statuses.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Marks a running pipeline cancelled.
    ///
    /// The in-flight step is not interrupted; the executor stops at the next
    /// step boundary. Records already terminal are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the pipeline has no record.
    pub fn cancel_pipeline(&self, pipeline_name: &str) -> EngineResult<()> {
        let record = self.record(pipeline_name)?;
        if record.write().finish(PipelineState::Cancelled) {
            info!(pipeline = %pipeline_name, "Pipeline marked cancelled");
        }
        Ok(())
    }

    /// Removes a pipeline's record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the pipeline has no record.
    pub fn clear_pipeline_status(&self, pipeline_name: &str) -> EngineResult<()> {
        self.statuses
            .write()
            .remove(pipeline_name)
            .map(|_| ())
            .ok_or_else(|| EngineError::PipelineNotFound(pipeline_name.to_string()))
    }

    /// Removes every record.
    pub fn clear_all_pipeline_status(&self) {
        self.statuses.write().clear();
    }

    fn record(&self, pipeline_name: &str) -> EngineResult<StatusRecord> {
        self.statuses
            .read()
            .get(pipeline_name)
            .cloned()
            .ok_or_else(|| EngineError::PipelineNotFound(pipeline_name.to_string()))
    }
}

fn cancelled_by_caller(pipeline_name: &str) -> EngineError {
    ContextError::Cancelled {
        reason: Some(format!("pipeline '{pipeline_name}' was cancelled")),
    }
    .into()
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("registry", &self.registry)
            .field("pipelines", &self.list_pipelines())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepConfig;
    use crate::errors::ErrorKind;
    use crate::testing::{FailingHandler, NoopHandler, RecordingHandler, CallLog};
    use pretty_assertions::assert_eq;

    fn executor() -> PipelineExecutor {
        PipelineExecutor::new(Arc::new(StepRegistry::new()), Arc::new(HookManager::new()))
    }

    #[tokio::test]
    async fn test_unknown_pipeline_lookups() {
        let executor = executor();
        assert_eq!(
            executor.get_pipeline_status("p").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            executor.get_pipeline_logs("p").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            executor.cancel_pipeline("p").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            executor.clear_pipeline_status("p").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_step_result_carries_metadata_and_report() {
        let executor = executor();
        let log = CallLog::new();
        let config = StepConfig::new("build").with_metadata("lang", serde_json::json!("go"));
        executor
            .registry()
            .register_step("build", Arc::new(RecordingHandler::new(config, log)))
            .unwrap();

        executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap();

        let result = executor.get_step_status("p", "build").unwrap();
        assert!(result.success);
        assert_eq!(result.output, "build done\n");
        assert_eq!(result.metadata["lang"], serde_json::json!("go"));
        assert_eq!(
            executor.get_step_status("p", "test").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_failed_step_marks_pipeline_failed() {
        let executor = executor();
        let failing = Arc::new(FailingHandler::new(StepConfig::new("lint"), "3 issues found"));
        executor.registry().register_step("lint", failing.clone()).unwrap();

        let err = executor
            .execute_pipeline(&StepContext::new(), "ci", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StepFailed);
        assert!(err.to_string().starts_with("pipeline 'ci' failed at step 'lint'"));

        let status = executor.get_pipeline_status("ci").unwrap();
        assert_eq!(status.status, PipelineState::Failed);
        assert!(status.end_time.is_some());
        let result = &status.steps["lint"];
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("3 issues found"));
    }

    #[tokio::test]
    async fn test_unregistered_step_in_explicit_list_fails() {
        let executor = executor();

        let err = executor
            .execute_pipeline(&StepContext::new(), "p", &["ghost".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Failed);
        assert!(!status.steps["ghost"].success);
    }

    #[tokio::test]
    async fn test_single_step_leaves_record_running() {
        let executor = executor();
        let noop = Arc::new(NoopHandler::named("setup"));
        executor.registry().register_step("setup", noop.clone()).unwrap();

        executor
            .execute_step(&StepContext::new(), "adhoc", "setup")
            .await
            .unwrap();

        let status = executor.get_pipeline_status("adhoc").unwrap();
        assert_eq!(status.status, PipelineState::Running);
        assert!(status.end_time.is_none());
        assert!(status.steps["setup"].success);
        assert_eq!(noop.calls(), 1);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_record() {
        let executor = executor();
        executor
            .registry()
            .register_step("a", Arc::new(NoopHandler::named("a")))
            .unwrap();

        executor
            .execute_pipeline(&StepContext::new(), "p", &["a".to_string()])
            .await
            .unwrap();
        executor
            .execute_pipeline(&StepContext::new(), "p", &["a".to_string()])
            .await
            .unwrap();

        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.steps.len(), 1);
        assert_eq!(executor.list_pipelines(), vec!["p"]);
    }

    #[tokio::test]
    async fn test_cancel_only_affects_running_records() {
        let executor = executor();
        executor
            .registry()
            .register_step("a", Arc::new(NoopHandler::named("a")))
            .unwrap();
        executor
            .execute_step(&StepContext::new(), "adhoc", "a")
            .await
            .unwrap();
        executor
            .execute_pipeline(&StepContext::new(), "done", &[])
            .await
            .unwrap();

        executor.cancel_pipeline("adhoc").unwrap();
        executor.cancel_pipeline("done").unwrap();

        assert_eq!(
            executor.get_pipeline_status("adhoc").unwrap().status,
            PipelineState::Cancelled
        );
        assert_eq!(
            executor.get_pipeline_status("done").unwrap().status,
            PipelineState::Completed
        );
    }

    #[tokio::test]
    async fn test_clear_records() {
        let executor = executor();
        executor
            .execute_pipeline(&StepContext::new(), "a", &[])
            .await
            .unwrap();
        executor
            .execute_pipeline(&StepContext::new(), "b", &[])
            .await
            .unwrap();

        executor.clear_pipeline_status("a").unwrap();
        assert_eq!(executor.list_pipelines(), vec!["b"]);

        executor.clear_all_pipeline_status();
        assert!(executor.list_pipelines().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pipeline_name_is_rejected() {
        let executor = executor();
        let err = executor
            .execute_pipeline(&StepContext::new(), "", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(executor.list_pipelines().is_empty());
    }
}
