//! Job store: in-memory cache with optional SQLite persistence.
//!
//! The cache is authoritative for live lookups; every mutation is also
//! written through to the database when one is attached. Status
//! transitions are validated here so no caller can regress a terminal
//! job or move progress backwards.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::db::job_repo::{self, JobRow};
use crate::db::Database;
use crate::format::Format;
use crate::job::record::{JobCounts, JobRecord, JobStatus};
use crate::routing::StrategyId;

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_row(record: &JobRecord) -> JobRow {
    JobRow {
        id: record.id.clone(),
        filename: record.filename.clone(),
        source_format: record.source_format.as_tag().to_string(),
        destination_format: record.destination_format.as_tag().to_string(),
        input_hash: record.input_hash.clone(),
        status: record.status.as_str().to_string(),
        progress: record.progress as i64,
        output_path: record
            .output_path
            .as_ref()
            .map(|p| p.display().to_string()),
        error: record.error.clone(),
        method_used: record.method_used.clone(),
        created_at: format_timestamp(record.created_at),
        updated_at: format_timestamp(record.updated_at),
    }
}

fn from_row(row: &JobRow) -> Option<JobRecord> {
    let source_format = Format::from_tag(&row.source_format)?;
    let destination_format = Format::from_tag(&row.destination_format)?;
    let status = JobStatus::parse(&row.status).unwrap_or_else(|| {
        log::warn!(
            "Unknown job status '{}' for job {}, treating as error",
            row.status,
            row.id
        );
        JobStatus::Error
    });

    Some(JobRecord {
        id: row.id.clone(),
        status,
        progress: row.progress.clamp(0, 100) as u8,
        source_format,
        destination_format,
        filename: row.filename.clone(),
        input_hash: row.input_hash.clone(),
        output_path: row.output_path.as_ref().map(Into::into),
        error: row.error.clone(),
        method_used: row.method_used.clone(),
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

/// Tracks the lifecycle of every submitted conversion job.
pub struct JobStore {
    cache: RwLock<HashMap<String, JobRecord>>,
    db: RwLock<Option<Database>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            db: RwLock::new(None),
        }
    }

    /// Attaches a database; subsequent mutations are written through.
    pub fn set_database(&self, db: Database) {
        let mut guard = match self.db.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store DB lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = Some(db);
    }

    /// Cloned database handle if one is attached (inner `Arc`, cheap).
    pub fn get_database(&self) -> Option<Database> {
        let guard = match self.db.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store DB lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.clone()
    }

    /// Inserts a freshly created job.
    pub fn insert(&self, record: JobRecord) {
        self.persist(&record);
        self.write_cache().insert(record.id.clone(), record);
    }

    /// Looks a job up, checking cache then database.
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        if let Some(record) = self.read_cache().get(id).cloned() {
            return Some(record);
        }
        if let Some(db) = self.get_database() {
            if let Ok(Some(row)) = job_repo::find_by_id(&db, id) {
                return from_row(&row);
            }
        }
        None
    }

    /// Removes a job and returns its record. A given id is returned at
    /// most once across concurrent removals, which is what makes the
    /// caller's release-exactly-once guarantee hold.
    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        let removed = self.write_cache().remove(id);
        let mut from_db = None;
        if let Some(db) = self.get_database() {
            if removed.is_none() {
                if let Ok(Some(row)) = job_repo::find_by_id(&db, id) {
                    from_db = from_row(&row);
                }
            }
            match job_repo::delete(&db, id) {
                Ok(existed) => {
                    if removed.is_none() && !existed {
                        return None;
                    }
                }
                Err(e) => log::error!("Failed to delete job {} from database: {}", id, e),
            }
        }
        removed.or(from_db)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.read_cache().values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn counts(&self) -> JobCounts {
        let cache = self.read_cache();
        let mut counts = JobCounts::default();
        for record in cache.values() {
            match record.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Converting => counts.converting += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Input hashes referenced by jobs in a non-terminal state.
    pub fn active_input_hashes(&self) -> HashSet<String> {
        self.read_cache()
            .values()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.input_hash.clone())
            .collect()
    }

    /// `pending → converting`. Returns false when the job no longer
    /// exists (deleted before dispatch picked it up).
    pub fn mark_converting(&self, id: &str) -> bool {
        self.transition(id, |record| {
            record.status = JobStatus::Converting;
            record.progress = 0;
        })
    }

    /// Raises progress while converting. Decreases are ignored so the
    /// value is monotonically non-decreasing; values above 100 clamp.
    pub fn set_progress(&self, id: &str, progress: u8) {
        let mut cache = self.write_cache();
        let Some(record) = cache.get_mut(id) else {
            return;
        };
        if record.status != JobStatus::Converting {
            return;
        }
        let clamped = progress.min(100);
        if clamped > record.progress {
            record.progress = clamped;
            record.updated_at = Utc::now();
            let snapshot = record.clone();
            drop(cache);
            self.persist(&snapshot);
        }
    }

    /// Terminal transition to `completed`. Returns false when the job
    /// was deleted mid-conversion, in which case the caller discards the
    /// produced artifact.
    pub fn complete(&self, id: &str, output_path: &Path, method: StrategyId) -> bool {
        self.transition(id, |record| {
            record.status = JobStatus::Completed;
            record.progress = 100;
            record.output_path = Some(output_path.to_path_buf());
            record.method_used = Some(method.as_str().to_string());
            record.error = None;
        })
    }

    /// Terminal transition to `error`.
    pub fn fail(&self, id: &str, error: &str) -> bool {
        self.transition(id, |record| {
            record.status = JobStatus::Error;
            record.error = Some(error.to_string());
        })
    }

    /// Applies a transition to a non-terminal job. Transitioning a
    /// terminal job is a programming error: asserted in debug builds,
    /// logged and ignored in release.
    fn transition<F: FnOnce(&mut JobRecord)>(&self, id: &str, apply: F) -> bool {
        let mut cache = self.write_cache();
        let Some(record) = cache.get_mut(id) else {
            return false;
        };
        if record.status.is_terminal() {
            debug_assert!(false, "transition on terminal job {id}");
            log::error!(
                "Refusing transition on terminal job {} (status {})",
                id,
                record.status
            );
            return false;
        }
        apply(record);
        record.updated_at = Utc::now();
        let snapshot = record.clone();
        drop(cache);
        self.persist(&snapshot);
        true
    }

    /// Loads persisted jobs into the cache. Terminal jobs are restored
    /// as-is; jobs interrupted mid-flight (`pending` or `converting`)
    /// are reset to `pending` with zero progress so the caller can
    /// re-dispatch them. Returns the number of jobs loaded.
    pub fn load_from_database(&self) -> usize {
        let Some(db) = self.get_database() else {
            return 0;
        };

        let rows = match job_repo::list_all(&db) {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("Failed to load jobs from database: {}", e);
                return 0;
            }
        };

        let mut loaded = 0;
        let mut reset = Vec::new();
        {
            let mut cache = self.write_cache();
            for row in &rows {
                let Some(mut record) = from_row(row) else {
                    log::warn!("Skipping unparseable job row {}", row.id);
                    continue;
                };
                if !record.status.is_terminal() {
                    record.status = JobStatus::Pending;
                    record.progress = 0;
                    record.error = None;
                    record.updated_at = Utc::now();
                    reset.push(record.clone());
                }
                cache.insert(record.id.clone(), record);
                loaded += 1;
            }
        }
        for record in &reset {
            self.persist(record);
        }

        log::info!("Loaded {} jobs from database into cache", loaded);
        loaded
    }

    fn persist(&self, record: &JobRecord) {
        if let Some(db) = self.get_database() {
            if let Err(e) = job_repo::upsert(&db, &to_row(record)) {
                log::error!("Failed to persist job {} to database: {}", record.id, e);
            }
        }
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
