//! Resource shutdown in LIFO order.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

type Closer = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Registry of named resource closers run at shutdown.
///
/// Closers run last-registered first. A closer that fails or exceeds its
/// timeout is logged and the remaining closers still run.
#[derive(Default)]
pub struct ShutdownRegistry {
    closers: Mutex<Vec<(String, Closer)>>,
}

impl ShutdownRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closer for a named resource.
    pub fn register<F, Fut>(&self, name: impl Into<String>, closer: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: Closer = Box::new(move || closer().boxed());
        self.closers.lock().push((name.into(), boxed));
    }

    /// Returns the number of closers not yet run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.closers.lock().len()
    }

    /// Runs every closer, each bounded by `per_closer_timeout`.
    ///
    /// Returns the names of the closers that failed or timed out.
    pub async fn close_all(&self, per_closer_timeout: Duration) -> Vec<String> {
        let closers = std::mem::take(&mut *self.closers.lock());
        let mut failed = Vec::new();

        for (name, closer) in closers.into_iter().rev() {
            match tokio::time::timeout(per_closer_timeout, closer()).await {
                Ok(Ok(())) => debug!(resource = %name, "Closed resource"),
                Ok(Err(e)) => {
                    error!(resource = %name, error = %format!("{e:#}"), "Failed to close resource");
                    failed.push(name);
                }
                Err(_) => {
                    error!(resource = %name, "Timed out closing resource");
                    failed.push(name);
                }
            }
        }

        failed
    }
}

impl std::fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
