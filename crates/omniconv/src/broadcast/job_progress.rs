//! Job progress broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::JobStatus;

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job identifier.
    pub job_id: String,
    /// Original upload filename.
    pub filename: String,
    /// Job status at the time of the event.
    pub status: JobStatus,
    /// Progress 0–100.
    pub progress: u8,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Strategy currently being attempted, or the one that succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Output path (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    pub fn new(
        job_id: &str,
        filename: &str,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            status,
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
            strategy: None,
            output_path: None,
            error: None,
        }
    }

    pub fn completed(job_id: &str, filename: &str, output_path: &str, strategy: &str) -> Self {
        let mut event = Self::new(
            job_id,
            filename,
            JobStatus::Completed,
            100,
            "Conversion completed successfully",
        );
        event.output_path = Some(output_path.to_string());
        event.strategy = Some(strategy.to_string());
        event
    }

    pub fn failed(job_id: &str, filename: &str, error: &str) -> Self {
        let mut event = Self::new(job_id, filename, JobStatus::Error, 0, "Conversion failed");
        event.error = Some(error.to_string());
        event
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers. No active receivers is fine.
    pub fn send(&self, event: JobProgressEvent) {
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Gets the inner sender for creating trackers.
    pub fn sender(&self) -> Arc<broadcast::Sender<JobProgressEvent>> {
        Arc::clone(&self.sender)
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(128)
    }
}

/// Tracks progress for a single job.
pub struct JobProgressTracker {
    job_id: String,
    filename: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(
        job_id: &str,
        filename: &str,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            sender,
        }
    }

    /// Emits a status update.
    pub fn update(&self, status: JobStatus, progress: u8, message: &str, strategy: Option<&str>) {
        let mut event =
            JobProgressEvent::new(&self.job_id, &self.filename, status, progress, message);
        event.strategy = strategy.map(|s| s.to_string());
        let _ = self.sender.send(event);
    }

    /// Marks the job as completed with result details.
    pub fn completed(&self, output_path: &str, strategy: &str) {
        let event =
            JobProgressEvent::completed(&self.job_id, &self.filename, output_path, strategy);
        let _ = self.sender.send(event);
    }

    /// Marks the job as failed with an error message.
    pub fn failed(&self, error: &str) {
        let event = JobProgressEvent::failed(&self.job_id, &self.filename, error);
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let event = JobProgressEvent::new("job-1", "a.pdf", JobStatus::Pending, 0, "Queued");
        broadcaster.send(event);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, "job-1");
        assert_eq!(received.filename, "a.pdf");
        assert_eq!(received.status, JobStatus::Pending);
    }

    #[test]
    fn test_tracker_update() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let tracker = JobProgressTracker::new("job-2", "b.docx", broadcaster.sender());
        tracker.update(JobStatus::Converting, 33, "Trying soffice (1/3)", Some("soffice"));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.status, JobStatus::Converting);
        assert_eq!(received.progress, 33);
        assert_eq!(received.strategy.as_deref(), Some("soffice"));
    }

    #[test]
    fn test_tracker_completed() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let tracker = JobProgressTracker::new("job-3", "c.png", broadcaster.sender());
        tracker.completed("/out/job-3.jpg", "raster");

        let received = rx.try_recv().unwrap();
        assert_eq!(received.status, JobStatus::Completed);
        assert_eq!(received.progress, 100);
        assert_eq!(received.output_path.as_deref(), Some("/out/job-3.jpg"));
        assert_eq!(received.strategy.as_deref(), Some("raster"));
    }

    #[test]
    fn test_tracker_failed() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let tracker = JobProgressTracker::new("job-4", "d.mp4", broadcaster.sender());
        tracker.failed("all 1 conversion strategies failed: ffmpeg: tool missing");

        let received = rx.try_recv().unwrap();
        assert_eq!(received.status, JobStatus::Error);
        assert!(received.error.as_deref().unwrap().contains("ffmpeg"));
    }

    #[test]
    fn test_send_without_receivers_is_ok() {
        let broadcaster = JobProgressBroadcaster::default();
        broadcaster.send(JobProgressEvent::new(
            "job-5",
            "e.txt",
            JobStatus::Pending,
            0,
            "Queued",
        ));
    }
}
