//! Progress reporting seam between the dispatcher and the outside world.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::{JobProgressEvent, JobProgressTracker};
use crate::job::{JobRecord, JobStatus};
use crate::routing::StrategyId;

/// Events emitted by the dispatcher while working a job.
pub enum ProgressEvent {
    Started,
    Attempt {
        strategy: StrategyId,
        attempt: usize,
        total: usize,
        progress: u8,
    },
    AttemptFailed {
        strategy: StrategyId,
        error: String,
        progress: u8,
    },
    Completed {
        strategy: StrategyId,
        output_path: String,
    },
    Failed {
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges dispatcher events onto the job progress broadcast channel.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
}

impl BroadcastProgress {
    pub fn for_job(job: &JobRecord, sender: Arc<broadcast::Sender<JobProgressEvent>>) -> Self {
        Self {
            tracker: JobProgressTracker::new(&job.id, &job.filename, sender),
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started => {
                self.tracker
                    .update(JobStatus::Converting, 0, "Conversion started", None);
            }
            ProgressEvent::Attempt {
                strategy,
                attempt,
                total,
                progress,
            } => {
                self.tracker.update(
                    JobStatus::Converting,
                    progress,
                    &format!("Trying {strategy} ({attempt}/{total})"),
                    Some(strategy.as_str()),
                );
            }
            ProgressEvent::AttemptFailed {
                strategy,
                error,
                progress,
            } => {
                self.tracker.update(
                    JobStatus::Converting,
                    progress,
                    &format!("{strategy} failed: {error}"),
                    Some(strategy.as_str()),
                );
            }
            ProgressEvent::Completed {
                strategy,
                output_path,
            } => {
                self.tracker.completed(&output_path, strategy.as_str());
            }
            ProgressEvent::Failed { error } => {
                self.tracker.failed(&error);
            }
        }
    }
}
