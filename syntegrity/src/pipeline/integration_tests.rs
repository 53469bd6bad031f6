//! End-to-end tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::cancellation::StepContext;
    use crate::core::{HookPhase, PipelineState, StepConfig};
    use crate::errors::ErrorKind;
    use crate::hooks::{Hook, HookManager};
    use crate::pipeline::PipelineExecutor;
    use crate::steps::{StepHandler, StepRegistry};
    use crate::testing::{CallLog, FlakyHandler, NoopHandler, RecordingHandler, SlowHandler};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn executor() -> PipelineExecutor {
        PipelineExecutor::new(Arc::new(StepRegistry::new()), Arc::new(HookManager::new()))
    }

    fn register(executor: &PipelineExecutor, handler: Arc<dyn StepHandler>, name: &str) {
        executor.registry().register_step(name, handler).unwrap();
    }

    fn recording(log: &CallLog, name: &str, deps: &[&str]) -> Arc<dyn StepHandler> {
        Arc::new(RecordingHandler::new(
            StepConfig::new(name).depends_on(deps.iter().copied()),
            log.clone(),
        ))
    }

    #[tokio::test]
    async fn test_happy_path_runs_in_dependency_order() {
        let executor = executor();
        let log = CallLog::new();
        register(&executor, recording(&log, "c", &["b"]), "c");
        register(&executor, recording(&log, "a", &[]), "a");
        register(&executor, recording(&log, "b", &["a"]), "b");

        assert_eq!(
            executor.registry().get_execution_order().unwrap(),
            vec!["a", "b", "c"]
        );

        executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap();

        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Completed);
        assert!(status.end_time.is_some());
        assert!(status.end_time.unwrap() >= status.start_time);
        assert!(status.steps.values().all(|r| r.success));
        assert_eq!(log.entries(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_succeed_on_third_attempt() {
        let executor = executor();
        let flaky = Arc::new(FlakyHandler::new(StepConfig::new("r").with_retries(2), 2));
        register(&executor, flaky.clone(), "r");

        let start = Instant::now();
        executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap();

        assert_eq!(flaky.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
        let result = executor.get_step_status("p", "r").unwrap();
        assert!(result.success);
        assert!(result.duration >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_circular_dependency_fails_pipeline() {
        let executor = executor();
        let a = StepConfig::new("a").depends_on(["b"]);
        let b = StepConfig::new("b").depends_on(["a"]);
        register(&executor, Arc::new(NoopHandler::new(a)), "a");
        register(&executor, Arc::new(NoopHandler::new(b)), "b");

        let err = executor.registry().get_execution_order().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
        let message = err.to_string();
        assert!(message.contains("'a'") || message.contains("'b'"));

        let err = executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
        assert!(err.to_string().contains("failed to get execution order"));

        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Failed);
        assert!(status.steps.is_empty());
    }

    #[tokio::test]
    async fn test_before_hook_vetoes_step() {
        let executor = executor();
        let handler = Arc::new(NoopHandler::named("s"));
        register(&executor, handler.clone(), "s");
        executor
            .hooks()
            .register_hook(
                "s",
                HookPhase::Before,
                Hook::new(|_ctx| async { Err(anyhow::anyhow!("change freeze")) }),
            )
            .unwrap();

        let err = executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BeforeHooksFailed);
        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Failed);
        let result = &status.steps["s"];
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("before hooks failed"));
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_pipeline() {
        let executor = executor();
        let log = CallLog::new();
        let slow = Arc::new(SlowHandler::with_delay_ms(StepConfig::new("x"), 100));
        register(&executor, slow.clone(), "x");
        register(&executor, recording(&log, "y", &["x"]), "y");
        register(&executor, recording(&log, "z", &["y"]), "z");

        let ctx = StepContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel("interrupted");
        });

        let err = executor.execute_pipeline(&ctx, "p", &[]).await.unwrap_err();

        assert!(err.is_cancelled());
        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Cancelled);
        assert!(!status.steps["x"].success);
        assert!(!status.steps.contains_key("y"));
        assert!(!status.steps.contains_key("z"));
        assert!(log.is_empty());
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_context_before_first_step() {
        let executor = executor();
        let handler = Arc::new(NoopHandler::named("a"));
        register(&executor, handler.clone(), "a");

        let ctx = StepContext::new();
        ctx.cancel("not today");
        let err = executor.execute_pipeline(&ctx, "p", &[]).await.unwrap_err();

        assert_eq!(err.to_string(), "context cancelled: not today");
        assert_eq!(
            executor.get_pipeline_status("p").unwrap().status,
            PipelineState::Cancelled
        );
        assert_eq!(handler.calls(), 0);
    }

    fn cancel_record_after(executor: &Arc<PipelineExecutor>, pipeline: &str, delay: Duration) {
        let executor = executor.clone();
        let pipeline = pipeline.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            executor.cancel_pipeline(&pipeline).unwrap();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pipeline_stops_at_next_step() {
        let executor = Arc::new(executor());
        let log = CallLog::new();
        let slow = Arc::new(SlowHandler::with_delay_ms(StepConfig::new("x"), 100));
        register(&executor, slow.clone(), "x");
        register(&executor, recording(&log, "y", &["x"]), "y");

        cancel_record_after(&executor, "p", Duration::from_millis(50));
        let err = executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.to_string(), "context cancelled: pipeline 'p' was cancelled");
        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Cancelled);
        // The in-flight step finishes and is recorded.
        assert!(status.steps["x"].success);
        assert!(!status.steps.contains_key("y"));
        assert!(log.is_empty());
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pipeline_during_last_step_returns_cancelled() {
        let executor = Arc::new(executor());
        let slow = Arc::new(SlowHandler::with_delay_ms(StepConfig::new("only"), 100));
        register(&executor, slow.clone(), "only");

        cancel_record_after(&executor, "p", Duration::from_millis(50));
        let err = executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Cancelled);
        assert!(status.steps["only"].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pipeline_during_failing_step_returns_cancelled() {
        let executor = Arc::new(executor());
        let config = StepConfig::new("f").with_timeout(Duration::from_millis(100));
        register(&executor, Arc::new(SlowHandler::new(config, Duration::from_secs(5))), "f");

        cancel_record_after(&executor, "p", Duration::from_millis(50));
        let err = executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "context cancelled: pipeline 'p' was cancelled");
        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Cancelled);
        assert!(!status.steps["f"].success);
    }

    #[tokio::test]
    async fn test_unbounded_step_timeout_runs_step() {
        let executor = executor();
        let handler = Arc::new(NoopHandler::new(
            StepConfig::new("a").with_timeout(Duration::MAX),
        ));
        register(&executor, handler.clone(), "a");

        executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap();

        assert_eq!(
            executor.get_pipeline_status("p").unwrap().status,
            PipelineState::Completed
        );
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_explicit_step_list_bypasses_ordering() {
        let executor = executor();
        let log = CallLog::new();
        register(&executor, recording(&log, "a", &[]), "a");
        register(&executor, recording(&log, "b", &["a"]), "b");

        executor
            .execute_pipeline(&StepContext::new(), "p", &["b".to_string()])
            .await
            .unwrap();

        assert_eq!(log.entries(), vec!["b"]);
        let status = executor.get_pipeline_status("p").unwrap();
        assert_eq!(status.status, PipelineState::Completed);
        assert_eq!(status.steps.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_fails_step() {
        let executor = executor();
        let config = StepConfig::new("t").with_timeout(Duration::from_millis(20));
        register(&executor, Arc::new(SlowHandler::new(config, Duration::from_secs(5))), "t");

        let err = executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let status = executor.get_pipeline_status("p").unwrap();
        // The pipeline context itself is still live, so this is a step failure.
        assert_eq!(status.status, PipelineState::Failed);
        assert_eq!(
            status.steps["t"].error.as_deref(),
            Some("context deadline exceeded")
        );
    }

    #[tokio::test]
    async fn test_hook_phases_around_pipeline_steps() {
        let executor = executor();
        let log = CallLog::new();
        register(&executor, recording(&log, "build", &[]), "build");
        for phase in HookPhase::ALL {
            let log = log.clone();
            executor
                .hooks()
                .register_hook(
                    "build",
                    phase,
                    Hook::new(move |_ctx| {
                        let log = log.clone();
                        async move {
                            log.push(format!("{phase}"));
                            Ok(())
                        }
                    }),
                )
                .unwrap();
        }

        executor
            .execute_pipeline(&StepContext::new(), "p", &[])
            .await
            .unwrap();

        assert_eq!(log.entries(), vec!["before", "build", "success", "after"]);
    }

    #[tokio::test]
    async fn test_concurrent_pipelines_keep_separate_records() {
        let executor = Arc::new(executor());
        let log = CallLog::new();
        register(&executor, recording(&log, "a", &[]), "a");
        register(&executor, recording(&log, "b", &[]), "b");

        let first = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute_pipeline(&StepContext::new(), "first", &["a".to_string()])
                    .await
            })
        };
        let second = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute_pipeline(&StepContext::new(), "second", &["b".to_string()])
                    .await
            })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(executor.list_pipelines(), vec!["first", "second"]);
        assert!(executor.get_step_status("first", "a").is_ok());
        assert!(executor.get_step_status("first", "b").is_err());
        assert_eq!(log.len(), 2);
    }
}
