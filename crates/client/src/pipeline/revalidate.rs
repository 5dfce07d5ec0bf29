//! Background refresh of stale cache entries.

use spellcache_core::Error;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

/// Owner of detached revalidation tasks.
///
/// Failures are logged and dropped; the next stale access schedules another
/// attempt. Cloning shares the underlying tracker.
#[derive(Debug, Clone, Default)]
pub struct Revalidator {
    tracker: TaskTracker,
    /// Serializes `wait_idle`, which closes and reopens the shared tracker.
    idle: Arc<Mutex<()>>,
}

impl Revalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` in the background. Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, url: String, job: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match job.await {
                Ok(()) => tracing::debug!(%url, "revalidated"),
                Err(e) => tracing::warn!(%url, error = %e, "background revalidation failed"),
            }
        });
    }

    /// Number of revalidations still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every revalidation spawned so far has finished.
    ///
    /// Concurrent callers take turns; tasks spawned while a caller waits are
    /// included in that wait.
    pub async fn wait_idle(&self) {
        let _turn = self.idle.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
