use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::jobs::{JobId, JobRegistry};

/// Removes temporary files and expired job records
///
/// Immediate cleanup is best-effort: failures are logged and never reach the
/// caller. Delayed work runs as tracked tasks that are cancelled by
/// [`CleanupScheduler::shutdown`].
pub struct CleanupScheduler {
    retention: Duration,
    record_expiry: Duration,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl CleanupScheduler {
    pub fn new(retention: Duration, record_expiry: Duration) -> Self {
        Self {
            retention,
            record_expiry,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Best-effort delete of every path; missing files are not an error
    pub async fn cleanup(&self, paths: &[&Path]) {
        for path in paths {
            remove_file(path).await;
        }
    }

    /// Delete a delivered artifact once the retention window has passed
    pub fn schedule_retention(&self, path: PathBuf) {
        let delay = self.retention;
        debug!("Scheduling removal of {} in {:?}", path.display(), delay);
        self.spawn_delayed(delay, async move {
            remove_file(&path).await;
        });
    }

    /// Drop a terminal job's registry record after the expiry delay
    pub fn schedule_record_expiry(&self, registry: Arc<JobRegistry>, id: JobId) {
        self.spawn_delayed(self.record_expiry, async move {
            if registry.remove(&id).is_some() {
                debug!("Expired job record id={}", id);
            }
        });
    }

    /// Empty the given directories unconditionally. Unlike per-job cleanup,
    /// errors are returned to the caller.
    pub async fn purge_all(&self, dirs: &[&Path]) -> io::Result<usize> {
        let mut removed = 0;
        for dir in dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    tokio::fs::remove_file(entry.path()).await?;
                    info!("Deleted: {}", entry.path().display());
                    removed += 1;
                }
            }
            info!("Cleaned directory: {}", dir.display());
        }
        Ok(removed)
    }

    /// Cancel pending timers and wait for running cleanup tasks
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        info!("Waiting for {} cleanup tasks to stop...", self.tracker.len());
        self.tracker.wait().await;
    }

    fn spawn_delayed<F>(&self, delay: Duration, work: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!("Cleanup scheduler is shut down, dropping task");
            return;
        }

        // Only an explicit shutdown cancels; dropping the scheduler does not
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("Scheduled cleanup cancelled by shutdown"),
                _ = sleep(delay) => work.await,
            }
        });
    }
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Cleaned up: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not delete {}: {}", path.display(), e),
    }
}
