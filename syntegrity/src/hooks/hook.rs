//! Hook callbacks and registration handles.

use crate::cancellation::StepContext;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

type HookFn = dyn Fn(StepContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A callback attached to a (step, phase) pair.
///
/// Clones share identity: removing a clone removes the original.
#[derive(Clone)]
pub struct Hook {
    func: Arc<HookFn>,
}

impl Hook {
    /// Wraps an async closure as a hook.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |ctx| func(ctx).boxed()),
        }
    }

    /// Invokes the hook.
    pub async fn call(&self, ctx: StepContext) -> anyhow::Result<()> {
        (self.func)(ctx).await
    }

    /// Returns true if both values are the same registered callback.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.func).cast::<()>(),
            Arc::as_ptr(&other.func).cast::<()>(),
        )
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("ptr", &Arc::as_ptr(&self.func).cast::<()>())
            .finish()
    }
}

/// Handle returned by hook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookId(Uuid);

impl HookId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for HookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
