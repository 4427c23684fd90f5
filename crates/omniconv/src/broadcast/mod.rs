//! Real-time event streaming for poll-based consumers that also want
//! push updates.

pub mod job_progress;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, JobProgressTracker};
