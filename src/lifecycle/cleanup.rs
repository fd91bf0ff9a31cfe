use crate::error::Result;
use std::future::Future;
use tokio_util::task::TaskTracker;

/// In-flight background cleanups (container removal and the like).
///
/// Fixtures hand slow removals to [`CleanupSet::spawn`] so the test does not
/// block on them. [`crate::Fixtures::tear_down`] calls [`CleanupSet::wait`]
/// and does not return until every spawned cleanup has finished. A network
/// waits too, before it is removed.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct CleanupSet {
    tracker: TaskTracker,
}

impl CleanupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `cleanup` in the background. Failures are logged, never surfaced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, label: impl Into<String>, cleanup: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        tracing::trace!("Spawning background cleanup: {}", label);
        self.tracker.spawn(async move {
            if let Err(e) = cleanup.await {
                tracing::warn!("Background cleanup '{}' failed: {}", label, e);
            }
        });
    }

    /// Number of cleanups still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Block until every cleanup spawned so far has completed.
    ///
    /// Cleanups spawned while waiting are waited for too. The set stays
    /// usable afterwards.
    pub async fn wait(&self) {
        if self.tracker.is_empty() {
            return;
        }
        tracing::debug!("Waiting for {} background cleanup(s)", self.tracker.len());
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
