//! Step execution context carrying cancellation and deadlines.

use super::CancellationToken;
use crate::core::Artifact;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Why a context stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The token was cancelled.
    #[error("context cancelled{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Cancelled {
        /// The cancellation reason, if one was given.
        reason: Option<String>,
    },

    /// The deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Output and artifacts a handler reports while it runs.
#[derive(Debug, Default, Clone)]
pub struct StepReport {
    /// Collected output text.
    pub output: String,
    /// Produced artifacts.
    pub artifacts: Vec<Artifact>,
}

/// The context handed to step handlers and hooks.
///
/// Cloning is cheap; clones share the cancellation token and the step report.
#[derive(Debug, Clone)]
pub struct StepContext {
    token: Arc<CancellationToken>,
    deadline: Option<Instant>,
    report: Arc<Mutex<StepReport>>,
}

impl Default for StepContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StepContext {
    /// Creates a root context with a fresh token and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(Arc::new(CancellationToken::new()))
    }

    /// Creates a root context observing the given token.
    #[must_use]
    pub fn with_token(token: Arc<CancellationToken>) -> Self {
        Self {
            token,
            deadline: None,
            report: Arc::new(Mutex::new(StepReport::default())),
        }
    }

    /// Derives a context that also expires after `timeout`.
    ///
    /// The derived deadline never extends an existing one. A timeout too
    /// large to represent as an instant leaves the current deadline as is.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(existing), Some(candidate)) => Some(existing.min(candidate)),
            (existing, None) => existing,
            (None, candidate) => candidate,
        };
        Self {
            token: self.token.clone(),
            deadline,
            report: self.report.clone(),
        }
    }

    /// Derives a context with an empty report for one step execution.
    #[must_use]
    pub fn for_step(&self) -> Self {
        Self {
            token: self.token.clone(),
            deadline: self.deadline,
            report: Arc::new(Mutex::new(StepReport::default())),
        }
    }

    /// Returns the shared cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels the shared token.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns why this context is done, or `None` while it is live.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled {
                reason: self.token.reason(),
            });
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns true once the context is cancelled or expired.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Completes when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Sleeps for `duration` unless the context finishes first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            () = self.done() => Err(self.stopped()),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drives `fut` to completion unless the context finishes first.
    ///
    /// If the context finishes first, `fut` is dropped.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            output = fut => Ok(output),
            () = self.done() => Err(self.stopped()),
        }
    }

    /// Appends text to the step output.
    pub fn write_output(&self, text: &str) {
        let mut report = self.report.lock();
        report.output.push_str(text);
        if !text.ends_with('\n') {
            report.output.push('\n');
        }
    }

    /// Records an artifact produced by the step.
    pub fn add_artifact(&self, artifact: Artifact) {
        self.report.lock().artifacts.push(artifact);
    }

    /// Takes the collected report, leaving an empty one behind.
    #[must_use]
    pub fn take_report(&self) -> StepReport {
        std::mem::take(&mut *self.report.lock())
    }

    fn stopped(&self) -> ContextError {
        self.err().unwrap_or(ContextError::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_live() {
        let ctx = StepContext::new();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_is_shared_with_derived_contexts() {
        let ctx = StepContext::new();
        let child = ctx.with_timeout(Duration::from_secs(60));

        ctx.cancel("shutdown");

        assert_eq!(
            child.err(),
            Some(ContextError::Cancelled {
                reason: Some("shutdown".to_string())
            })
        );
        assert_eq!(child.err().unwrap().to_string(), "context cancelled: shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_extends_parent() {
        let parent = StepContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));

        assert_eq!(parent.deadline(), child.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_keeps_deadline() {
        let unbounded = StepContext::new().with_timeout(Duration::MAX);
        assert!(unbounded.deadline().is_none());
        assert!(unbounded.err().is_none());

        let parent = StepContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_aborts_on_deadline() {
        let ctx = StepContext::new().with_timeout(Duration::from_millis(100));
        let start = Instant::now();

        let result = ctx.sleep(Duration::from_secs(5)).await;

        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_when_live() {
        let ctx = StepContext::new();
        assert_eq!(ctx.sleep(Duration::from_secs(2)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_run_returns_output() {
        let ctx = StepContext::new();
        let value = ctx.run(async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_run_drops_future_on_cancel() {
        let ctx = StepContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("stop");
        });

        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(30)))
            .await;

        assert!(matches!(result, Err(ContextError::Cancelled { .. })));
    }

    #[test]
    fn test_report_is_per_step() {
        let ctx = StepContext::new();
        ctx.write_output("root");

        let step = ctx.for_step();
        step.write_output("building");
        step.with_timeout(Duration::from_secs(1)).write_output("done");

        assert_eq!(step.take_report().output, "building\ndone\n");
        assert_eq!(ctx.take_report().output, "root\n");
    }
}
