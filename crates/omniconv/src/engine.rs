//! The engine facade: the narrow contract the request-handling layer
//! talks to. Fire-and-poll: `submit` returns immediately, `status` is
//! polled, `open_output` streams the artifact once completed.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::dispatch::Dispatcher;
use crate::error::{JobError, Result, RoutingError, StoreError};
use crate::format::Format;
use crate::job::{JobCounts, JobRecord, JobStatus, JobStore};
use crate::routing::RoutingTable;
use crate::store::{CleanupReport, ContentStore, StorageLifecycle, StorageReport};
use crate::strategy::StrategyRegistry;
use crate::worker::{DispatchResult, DispatchTicket, WorkerPool};

/// Poll response for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_used: Option<String>,
}

impl From<&JobRecord> for JobStatusReport {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            progress: record.progress,
            output_path: record
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
            error: record.error.clone(),
            method_used: record.method_used.clone(),
        }
    }
}

pub struct ConversionEngine {
    routing: Arc<RoutingTable>,
    jobs: Arc<JobStore>,
    content: Arc<ContentStore>,
    lifecycle: StorageLifecycle,
    pool: WorkerPool,
    broadcaster: JobProgressBroadcaster,
}

impl ConversionEngine {
    /// Opens the engine with the default routing table and strategy set.
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with(
            config,
            RoutingTable::with_default_routes(),
            StrategyRegistry::with_defaults(),
        )
    }

    /// Opens the engine with a custom routing table and strategy
    /// registry. The table should only route to registered strategies.
    pub fn open_with(
        config: EngineConfig,
        routing: RoutingTable,
        registry: StrategyRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let work_dir = config.output_dir.join(".work");
        for dir in [&config.output_dir, &work_dir] {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        let content = Arc::new(ContentStore::open(&config.storage_dir)?);
        let jobs = Arc::new(JobStore::new());
        let broadcaster = JobProgressBroadcaster::new(config.progress_capacity);

        if let Some(path) = &config.database_path {
            let db = Database::open(path)?;
            jobs.set_database(db);
            jobs.load_from_database();
        }

        let routing = Arc::new(routing);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&routing),
            Arc::new(registry),
            Arc::clone(&jobs),
            Arc::clone(&content),
            config.output_dir.clone(),
            work_dir,
            config.strategy_timeout(),
            Some(broadcaster.sender()),
        ));
        let pool = WorkerPool::new(dispatcher, config.worker_count);

        let engine = Self {
            routing,
            lifecycle: StorageLifecycle::new(Arc::clone(&content), Arc::clone(&jobs)),
            jobs,
            content,
            pool,
            broadcaster,
        };
        engine.restore_jobs();

        Ok(engine)
    }

    /// Re-acquires content references for restored jobs and re-queues
    /// the ones the restart interrupted.
    fn restore_jobs(&self) {
        for record in self.jobs.list() {
            match self.content.acquire(&record.input_hash) {
                Ok(_) => {
                    if record.status == JobStatus::Pending {
                        if let Err(e) = self.pool.submit(DispatchTicket {
                            job_id: record.id.clone(),
                        }) {
                            log::error!("Failed to re-queue job {}: {}", record.id, e);
                        }
                    }
                }
                Err(_) if !record.status.is_terminal() => {
                    self.jobs
                        .fail(&record.id, "input content missing after restart");
                }
                Err(_) => {
                    log::warn!(
                        "Restored terminal job {} references missing content {}",
                        record.id,
                        record.input_hash
                    );
                }
            }
        }
    }

    /// Registers content (dedup), creates a pending job and schedules
    /// its dispatch. Returns the job id immediately.
    ///
    /// Unknown tags and unsupported pairs fail here, before anything is
    /// persisted.
    pub fn submit(
        &self,
        bytes: &[u8],
        filename: &str,
        source_tag: &str,
        destination_tag: &str,
    ) -> Result<String> {
        let source = Format::from_tag(source_tag)
            .ok_or_else(|| RoutingError::UnknownFormat(source_tag.to_string()))?;
        let destination = Format::from_tag(destination_tag)
            .ok_or_else(|| RoutingError::UnknownFormat(destination_tag.to_string()))?;
        self.routing.strategies_for(source, destination)?;

        let hash = self.content.put(bytes)?;
        self.content.acquire(&hash)?;

        let record = JobRecord::new(filename, source, destination, &hash);
        let job_id = record.id.clone();
        self.jobs.insert(record);

        self.broadcaster.send(JobProgressEvent::new(
            &job_id,
            filename,
            JobStatus::Pending,
            0,
            "Job queued for conversion",
        ));

        if let Err(e) = self.pool.submit(DispatchTicket {
            job_id: job_id.clone(),
        }) {
            // Roll back so a rejected submission leaves no live job or
            // dangling reference behind.
            self.jobs.remove(&job_id);
            self.content.release(&hash);
            return Err(e.into());
        }

        log::info!(
            "Submitted job {} ({} -> {}, {} bytes)",
            job_id,
            source,
            destination,
            bytes.len()
        );
        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatusReport> {
        let record = self
            .jobs
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(JobStatusReport::from(&record))
    }

    /// Opens the completed output for streaming. `NotReady` before
    /// completion, `NotFound` for unknown ids.
    pub fn open_output(&self, job_id: &str) -> Result<(PathBuf, File)> {
        let record = self
            .jobs
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        if record.status != JobStatus::Completed {
            return Err(JobError::NotReady(job_id.to_string()).into());
        }
        let path = record
            .output_path
            .ok_or_else(|| JobError::NotReady(job_id.to_string()))?;

        let file = File::open(&path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok((path, file))
    }

    /// Download filename: the upload's basename with the destination
    /// extension.
    pub fn download_name(&self, job_id: &str) -> Result<String> {
        let record = self
            .jobs
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        let stem = Path::new(&record.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("converted");
        Ok(format!(
            "{stem}.{}",
            record.destination_format.extension()
        ))
    }

    /// Removes the job, releases its input reference exactly once and
    /// deletes its output artifact. `NotFound` for ids that never
    /// existed or were already deleted.
    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        let record = self
            .jobs
            .remove(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        self.content.release(&record.input_hash);

        if let Some(output) = &record.output_path {
            if let Err(e) = std::fs::remove_file(output) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove output {}: {}", output.display(), e);
                }
            }
        }

        log::info!("Deleted job {}", job_id);
        Ok(())
    }

    /// The capability listing, derived directly from the routing table.
    pub fn supported_conversions(&self) -> Vec<(Format, Format)> {
        self.routing.supported_pairs()
    }

    pub fn list_jobs(&self) -> Vec<JobRecord> {
        self.jobs.list()
    }

    pub fn job_counts(&self) -> JobCounts {
        self.jobs.counts()
    }

    pub fn cleanup(&self) -> Result<CleanupReport> {
        Ok(self.lifecycle.cleanup()?)
    }

    pub fn storage_stats(&self) -> StorageReport {
        self.lifecycle.stats()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    /// Blocks until a worker reports a finished dispatch, or the timeout
    /// passes. Mostly useful for embedders that want synchronous waits.
    pub fn recv_result_timeout(&self, timeout: std::time::Duration) -> Option<DispatchResult> {
        self.pool.recv_result_timeout(timeout)
    }

    pub fn try_recv_result(&self) -> Option<DispatchResult> {
        self.pool.try_recv_result()
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Stops accepting work and joins all workers.
    pub fn wait(self) {
        self.pool.shutdown();
        self.pool.wait();
    }

    /// Submit rejection helper for embedders that pre-validate uploads.
    pub fn is_supported(&self, source_tag: &str, destination_tag: &str) -> bool {
        match (Format::from_tag(source_tag), Format::from_tag(destination_tag)) {
            (Some(source), Some(destination)) => self.routing.contains(source, destination),
            _ => false,
        }
    }
}

impl std::fmt::Debug for ConversionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("supported_pairs", &self.routing.len())
            .field("jobs", &self.jobs.counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use tempfile::TempDir;

    fn engine_config(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            storage_dir: dir.path().join("store"),
            output_dir: dir.path().join("converted"),
            database_path: None,
            worker_count: 2,
            strategy_timeout_secs: 10,
            progress_capacity: 64,
        }
    }

    #[test]
    fn test_unknown_format_rejected_at_submit() {
        let dir = TempDir::new().unwrap();
        let engine = ConversionEngine::open(engine_config(&dir)).unwrap();

        let err = engine
            .submit(b"data", "song.midi", "MIDI", "DOCX")
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Routing(RoutingError::UnknownFormat(_))
        ));
        // Nothing persisted.
        assert_eq!(engine.storage_stats().store.entry_count, 0);
        assert!(engine.list_jobs().is_empty());
        engine.wait();
    }

    #[test]
    fn test_unsupported_pair_rejected_at_submit() {
        let dir = TempDir::new().unwrap();
        let engine = ConversionEngine::open(engine_config(&dir)).unwrap();

        let err = engine.submit(b"data", "a.mp3", "MP3", "DOCX").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Routing(RoutingError::UnsupportedConversion { .. })
        ));
        assert_eq!(engine.storage_stats().store.entry_count, 0);
        engine.wait();
    }

    #[test]
    fn test_status_unknown_job() {
        let dir = TempDir::new().unwrap();
        let engine = ConversionEngine::open(engine_config(&dir)).unwrap();

        let err = engine.status("nope").unwrap_err();
        assert!(matches!(err, EngineError::Job(JobError::NotFound(_))));
        engine.wait();
    }

    #[test]
    fn test_delete_unknown_job() {
        let dir = TempDir::new().unwrap();
        let engine = ConversionEngine::open(engine_config(&dir)).unwrap();

        let err = engine.delete_job("nope").unwrap_err();
        assert!(matches!(err, EngineError::Job(JobError::NotFound(_))));
        engine.wait();
    }

    #[test]
    fn test_supported_conversions_nonempty() {
        let dir = TempDir::new().unwrap();
        let engine = ConversionEngine::open(engine_config(&dir)).unwrap();

        let pairs = engine.supported_conversions();
        assert!(pairs.contains(&(Format::Pdf, Format::Txt)));
        assert!(pairs.contains(&(Format::Png, Format::Jpg)));
        assert!(!pairs.is_empty());

        assert!(engine.is_supported("pdf", "txt"));
        assert!(engine.is_supported("JPEG", "png"));
        assert!(!engine.is_supported("midi", "docx"));
        engine.wait();
    }
}
