//! Job Tracking
//!
//! The import runs under a job so operators can see it, but the pipeline
//! only needs four lifecycle calls; the tracker behind them is an
//! external collaborator hidden by the [`JobTracker`] trait.
//!
//! Progress updates are best effort: a failing tracker must never fail an
//! otherwise healthy import, so [`ProgressHandle::report`] logs a warning
//! and moves on. Creation and completion failures do propagate.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

/// Error type for tracker implementations outside this crate.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

pub type JobResult<T> = std::result::Result<T, JobError>;

/// Lifecycle hooks of the job behind an import.
#[async_trait]
pub trait JobTracker: Send + Sync {
    /// Register a new job and return its id.
    async fn created(&self, description: &str) -> JobResult<i64>;

    async fn started(&self, job_id: i64) -> JobResult<()>;

    /// Record fractional progress in `[0, 1]`.
    async fn progressed(&self, job_id: i64, fraction: f32) -> JobResult<()>;

    /// Mark the job finished, with the error message if it failed.
    async fn finished(&self, job_id: i64, error: Option<&str>) -> JobResult<()>;
}

/// Tracker that records the job lifecycle in the log. The default when no
/// external job system is wired in.
pub struct LogJobTracker {
    next_id: AtomicI64,
}

impl LogJobTracker {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for LogJobTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobTracker for LogJobTracker {
    async fn created(&self, description: &str) -> JobResult<i64> {
        let job_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(job_id, description, "job created");
        Ok(job_id)
    }

    async fn started(&self, job_id: i64) -> JobResult<()> {
        info!(job_id, "job started");
        Ok(())
    }

    async fn progressed(&self, job_id: i64, fraction: f32) -> JobResult<()> {
        info!(job_id, fraction, "job progressed");
        Ok(())
    }

    async fn finished(&self, job_id: i64, error: Option<&str>) -> JobResult<()> {
        match error {
            Some(error) => info!(job_id, error, "job finished with error"),
            None => info!(job_id, "job finished"),
        }
        Ok(())
    }
}

/// A tracker plus a job id, passed into the pipeline for its fixed
/// progress reports (1/3 after the reader, 2/3 after the sorter).
#[derive(Clone)]
pub struct ProgressHandle {
    tracker: Arc<dyn JobTracker>,
    job_id: i64,
}

impl ProgressHandle {
    pub fn new(tracker: Arc<dyn JobTracker>, job_id: i64) -> Self {
        Self { tracker, job_id }
    }

    /// Best-effort progress report; failures are logged and swallowed.
    pub async fn report(&self, fraction: f32) {
        if let Err(e) = self.tracker.progressed(self.job_id, fraction).await {
            warn!(job_id = self.job_id, error = %e, "failed to update job progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingTracker {
        fractions: Mutex<Vec<f32>>,
        fail_progress: bool,
    }

    #[async_trait]
    impl JobTracker for RecordingTracker {
        async fn created(&self, _description: &str) -> JobResult<i64> {
            Ok(7)
        }
        async fn started(&self, _job_id: i64) -> JobResult<()> {
            Ok(())
        }
        async fn progressed(&self, _job_id: i64, fraction: f32) -> JobResult<()> {
            if self.fail_progress {
                return Err("tracker down".into());
            }
            self.fractions.lock().unwrap().push(fraction);
            Ok(())
        }
        async fn finished(&self, _job_id: i64, _error: Option<&str>) -> JobResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_log_tracker_assigns_increasing_ids() {
        let tracker = LogJobTracker::new();
        let a = tracker.created("first").await.unwrap();
        let b = tracker.created("second").await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_progress_handle_reports() {
        let tracker = Arc::new(RecordingTracker {
            fractions: Mutex::new(Vec::new()),
            fail_progress: false,
        });
        let handle = ProgressHandle::new(tracker.clone(), 7);
        handle.report(1.0 / 3.0).await;
        handle.report(2.0 / 3.0).await;
        let fractions = tracker.fractions.lock().unwrap();
        assert_eq!(fractions.len(), 2);
    }

    #[tokio::test]
    async fn test_progress_failure_is_swallowed() {
        let tracker = Arc::new(RecordingTracker {
            fractions: Mutex::new(Vec::new()),
            fail_progress: true,
        });
        let handle = ProgressHandle::new(tracker, 7);
        // Must not panic or propagate.
        handle.report(0.5).await;
    }
}
