//! Garbage collection and usage reporting over the content store.

use std::sync::Arc;

use serde::Serialize;

use crate::error::StoreError;
use crate::job::{JobCounts, JobStore};
use crate::store::content::{ContentStore, StoreStats};

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub entries_removed: usize,
    pub bytes_reclaimed: u64,
}

/// Aggregate storage and job usage, for external reporting.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub store: StoreStats,
    pub jobs: JobCounts,
}

/// Reclaims content entries no jobs need anymore. Idempotent and safe
/// to run on any schedule, concurrently with uploads and dispatches.
pub struct StorageLifecycle {
    content: Arc<ContentStore>,
    jobs: Arc<JobStore>,
}

impl StorageLifecycle {
    pub fn new(content: Arc<ContentStore>, jobs: Arc<JobStore>) -> Self {
        Self { content, jobs }
    }

    /// Removes every entry with zero references that no non-terminal job
    /// names as its input. The per-entry eligibility re-check runs under
    /// the content store's write lock, so an acquire racing the sweep
    /// keeps its entry.
    pub fn cleanup(&self) -> Result<CleanupReport, StoreError> {
        let in_use = self.jobs.active_input_hashes();
        let mut report = CleanupReport::default();

        for hash in self.content.zero_ref_hashes() {
            match self.content.remove_if_unreferenced(&hash, &in_use) {
                Ok(Some(bytes)) => {
                    report.entries_removed += 1;
                    report.bytes_reclaimed += bytes;
                    log::debug!("Reclaimed content entry {} ({} bytes)", &hash[..12], bytes);
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Failed to remove content entry {}: {}", hash, e);
                }
            }
        }

        if report.entries_removed > 0 {
            log::info!(
                "Cleanup removed {} entries, reclaimed {} bytes",
                report.entries_removed,
                report.bytes_reclaimed
            );
        }

        Ok(report)
    }

    pub fn stats(&self) -> StorageReport {
        StorageReport {
            store: self.content.stats(),
            jobs: self.jobs.counts(),
        }
    }
}
