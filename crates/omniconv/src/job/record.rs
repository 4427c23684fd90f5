//! Job records and the status state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::Format;

/// Lifecycle status of a conversion job.
///
/// `Pending` and `Converting` are the only non-terminal states. A job
/// never leaves `Completed` or `Error`; attempting to is a programming
/// error, not a recoverable fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Converting,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Converting => "converting",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "converting" => Some(JobStatus::Converting),
            "completed" => Some(JobStatus::Completed),
            "error" => Some(JobStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked conversion request, from submission to terminal outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Opaque unique identifier, immutable after creation.
    pub id: String,
    pub status: JobStatus,
    /// 0–100; monotonically non-decreasing while converting.
    pub progress: u8,
    pub source_format: Format,
    pub destination_format: Format,
    /// Original upload filename, used for download naming.
    pub filename: String,
    /// Content store reference, not an owned copy of the bytes.
    pub input_hash: String,
    /// Owned by the job until deletion; set only on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Set only on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Name of the strategy that produced the result (diagnostic).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_used: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(
        filename: &str,
        source_format: Format,
        destination_format: Format,
        input_hash: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            progress: 0,
            source_format,
            destination_format,
            filename: filename.to_string(),
            input_hash: input_hash.to_string(),
            output_path: None,
            error: None,
            method_used: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// MIME type of the input, detected from the upload filename.
    pub fn input_mime(&self) -> Option<String> {
        mime_guess::from_path(&self.filename)
            .first()
            .map(|m| m.to_string())
    }
}

/// Job counts by status, for administrative reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub pending: u64,
    pub converting: u64,
    pub completed: u64,
    pub error: u64,
}
