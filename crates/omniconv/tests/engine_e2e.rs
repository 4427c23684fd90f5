//! End-to-end scenarios over a real engine with scripted strategies, so
//! nothing here depends on conversion tools being installed on the host.

use std::time::Duration;

use omniconv::{
    ConversionEngine, ConversionRequest, ConversionStrategy, EngineConfig, EngineError, Format,
    JobError, JobStatus, RoutingError, RoutingTable, StrategyError, StrategyId, StrategyRegistry,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

/// Succeeds and stamps the output with its own id.
struct SucceedAs(StrategyId);

impl ConversionStrategy for SucceedAs {
    fn id(&self) -> StrategyId {
        self.0
    }
    fn convert(
        &self,
        request: &ConversionRequest,
        _timeout: Duration,
    ) -> Result<(), StrategyError> {
        std::fs::write(&request.output, format!("converted-by-{}", self.0)).unwrap();
        Ok(())
    }
}

/// Always fails, pretending the tool is absent on this host.
struct FailAs(StrategyId);

impl ConversionStrategy for FailAs {
    fn id(&self) -> StrategyId {
        self.0
    }
    fn convert(
        &self,
        _request: &ConversionRequest,
        _timeout: Duration,
    ) -> Result<(), StrategyError> {
        Err(StrategyError::ToolMissing(self.0.as_str().to_string()))
    }
}

fn config(dir: &TempDir, with_db: bool) -> EngineConfig {
    EngineConfig {
        storage_dir: dir.path().join("store"),
        output_dir: dir.path().join("converted"),
        database_path: with_db.then(|| dir.path().join("jobs.db")),
        worker_count: 2,
        strategy_timeout_secs: 10,
        progress_capacity: 64,
    }
}

/// A table where PDF→DOCX falls through three strategies and TXT→PDF
/// succeeds immediately.
fn scripted_routes() -> RoutingTable {
    let mut table = RoutingTable::new();
    table.insert(
        Format::Pdf,
        Format::Docx,
        vec![StrategyId::Soffice, StrategyId::Pandoc, StrategyId::PdfToText],
    );
    table.insert(Format::Txt, Format::Pdf, vec![StrategyId::TextRender]);
    table.insert(Format::Txt, Format::Html, vec![StrategyId::Pandoc]);
    table
}

fn scripted_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    registry.register(Box::new(FailAs(StrategyId::Soffice)));
    registry.register(Box::new(FailAs(StrategyId::Pandoc)));
    registry.register(Box::new(SucceedAs(StrategyId::PdfToText)));
    registry.register(Box::new(SucceedAs(StrategyId::TextRender)));
    registry
}

fn wait_for(engine: &ConversionEngine, job_id: &str) -> JobStatus {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if let Some(result) = engine.recv_result_timeout(Duration::from_millis(200)) {
            if result.job_id == job_id {
                return engine.status(job_id).map(|r| r.status).unwrap_or(JobStatus::Error);
            }
        }
        if let Ok(report) = engine.status(job_id) {
            if report.status.is_terminal() {
                return report.status;
            }
        }
    }
    panic!("job {job_id} did not finish within {WAIT:?}");
}

#[test]
fn test_submit_to_completion_and_download() {
    let dir = TempDir::new().unwrap();
    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), scripted_registry())
            .unwrap();

    let job_id = engine
        .submit(b"plain text body", "notes.txt", "TXT", "PDF")
        .unwrap();
    assert_eq!(wait_for(&engine, &job_id), JobStatus::Completed);

    let report = engine.status(&job_id).unwrap();
    assert_eq!(report.progress, 100);
    assert_eq!(report.method_used.as_deref(), Some("text-render"));
    assert!(report.error.is_none());

    let (path, _file) = engine.open_output(&job_id).unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "converted-by-text-render"
    );
    assert_eq!(engine.download_name(&job_id).unwrap(), "notes.pdf");

    engine.wait();
}

#[test]
fn test_fallback_chain_on_degraded_host() {
    // Only the last strategy in the chain works on this "host".
    let dir = TempDir::new().unwrap();
    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), scripted_registry())
            .unwrap();

    let job_id = engine
        .submit(b"%PDF-fake", "report.pdf", "PDF", "DOCX")
        .unwrap();
    assert_eq!(wait_for(&engine, &job_id), JobStatus::Completed);

    let report = engine.status(&job_id).unwrap();
    assert_eq!(report.method_used.as_deref(), Some("pdftotext"));

    engine.wait();
}

#[test]
fn test_exhausted_chain_reports_aggregate_error() {
    let dir = TempDir::new().unwrap();
    let mut registry = StrategyRegistry::new();
    registry.register(Box::new(FailAs(StrategyId::Soffice)));
    registry.register(Box::new(FailAs(StrategyId::Pandoc)));
    registry.register(Box::new(FailAs(StrategyId::PdfToText)));

    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), registry).unwrap();

    let job_id = engine
        .submit(b"%PDF-fake", "report.pdf", "PDF", "DOCX")
        .unwrap();
    assert_eq!(wait_for(&engine, &job_id), JobStatus::Error);

    let report = engine.status(&job_id).unwrap();
    let error = report.error.unwrap();
    assert!(error.contains("all 3 conversion strategies failed"));
    assert!(error.contains("soffice"));
    assert!(error.contains("pdftotext"));

    // Output is not available for errored jobs.
    let err = engine.open_output(&job_id).unwrap_err();
    assert!(matches!(err, EngineError::Job(JobError::NotReady(_))));

    engine.wait();
}

#[test]
fn test_identical_uploads_share_one_entry() {
    let dir = TempDir::new().unwrap();
    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), scripted_registry())
            .unwrap();

    let bytes = b"10 bytes!!";
    let job_a = engine.submit(bytes, "a.txt", "TXT", "PDF").unwrap();
    let job_b = engine.submit(bytes, "b.txt", "TXT", "HTML").unwrap();
    assert_ne!(job_a, job_b);

    wait_for(&engine, &job_a);
    wait_for(&engine, &job_b);

    // Two jobs, one deduplicated entry, two references.
    let stats = engine.storage_stats();
    assert_eq!(stats.store.entry_count, 1);
    assert_eq!(stats.store.total_refs, 2);
    assert_eq!(stats.store.total_bytes, bytes.len() as u64);

    engine.wait();
}

#[test]
fn test_unsupported_pair_fails_fast() {
    let dir = TempDir::new().unwrap();
    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), scripted_registry())
            .unwrap();

    let err = engine
        .submit(b"MThd fake midi", "tune.midi", "TXT", "DOCX")
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Routing(RoutingError::UnsupportedConversion { .. })
    ));

    // No job, no stored content.
    assert!(engine.list_jobs().is_empty());
    assert_eq!(engine.storage_stats().store.entry_count, 0);

    engine.wait();
}

#[test]
fn test_delete_releases_input_and_cleanup_reclaims() {
    let dir = TempDir::new().unwrap();
    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), scripted_registry())
            .unwrap();

    let job_id = engine
        .submit(b"deletable content", "doc.txt", "TXT", "PDF")
        .unwrap();
    assert_eq!(wait_for(&engine, &job_id), JobStatus::Completed);

    let output = engine.open_output(&job_id).unwrap().0;
    assert!(output.exists());

    engine.delete_job(&job_id).unwrap();

    // Gone from the job store; repeated deletion is NotFound, not a crash.
    assert!(matches!(
        engine.status(&job_id).unwrap_err(),
        EngineError::Job(JobError::NotFound(_))
    ));
    assert!(matches!(
        engine.delete_job(&job_id).unwrap_err(),
        EngineError::Job(JobError::NotFound(_))
    ));

    // Output removed eagerly; input entry released, then reclaimed.
    assert!(!output.exists());
    assert_eq!(engine.storage_stats().store.total_refs, 0);

    let report = engine.cleanup().unwrap();
    assert_eq!(report.entries_removed, 1);
    assert_eq!(engine.storage_stats().store.entry_count, 0);

    engine.wait();
}

#[test]
fn test_cleanup_spares_shared_entry_until_last_delete() {
    let dir = TempDir::new().unwrap();
    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), scripted_registry())
            .unwrap();

    let bytes = b"shared input";
    let job_a = engine.submit(bytes, "a.txt", "TXT", "PDF").unwrap();
    let job_b = engine.submit(bytes, "b.txt", "TXT", "PDF").unwrap();
    wait_for(&engine, &job_a);
    wait_for(&engine, &job_b);

    engine.delete_job(&job_a).unwrap();
    engine.cleanup().unwrap();
    // Still referenced by job B.
    assert_eq!(engine.storage_stats().store.entry_count, 1);

    engine.delete_job(&job_b).unwrap();
    engine.cleanup().unwrap();
    assert_eq!(engine.storage_stats().store.entry_count, 0);

    engine.wait();
}

#[test]
fn test_progress_events_stream() {
    let dir = TempDir::new().unwrap();
    let engine =
        ConversionEngine::open_with(config(&dir, false), scripted_routes(), scripted_registry())
            .unwrap();

    let mut rx = engine.subscribe_progress();
    let job_id = engine
        .submit(b"streamed", "s.txt", "TXT", "PDF")
        .unwrap();
    assert_eq!(wait_for(&engine, &job_id), JobStatus::Completed);

    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.job_id, job_id);
        statuses.push(event.status);
    }
    assert_eq!(statuses.first(), Some(&JobStatus::Pending));
    assert_eq!(statuses.last(), Some(&JobStatus::Completed));

    engine.wait();
}

#[test]
fn test_restart_restores_terminal_jobs_and_references() {
    let dir = TempDir::new().unwrap();

    let (job_id, output) = {
        let engine = ConversionEngine::open_with(
            config(&dir, true),
            scripted_routes(),
            scripted_registry(),
        )
        .unwrap();
        let job_id = engine
            .submit(b"durable job", "d.txt", "TXT", "PDF")
            .unwrap();
        assert_eq!(wait_for(&engine, &job_id), JobStatus::Completed);
        let output = engine.open_output(&job_id).unwrap().0;
        engine.wait();
        (job_id, output)
    };

    // A fresh engine over the same directories sees the finished job.
    let engine = ConversionEngine::open_with(
        config(&dir, true),
        scripted_routes(),
        scripted_registry(),
    )
    .unwrap();

    let report = engine.status(&job_id).unwrap();
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.method_used.as_deref(), Some("text-render"));
    assert!(output.exists());

    // The restored job holds its input reference again, so cleanup must
    // not reclaim the entry.
    assert_eq!(engine.storage_stats().store.total_refs, 1);
    engine.cleanup().unwrap();
    assert_eq!(engine.storage_stats().store.entry_count, 1);

    // Deleting after restart releases and reclaims normally.
    engine.delete_job(&job_id).unwrap();
    engine.cleanup().unwrap();
    assert_eq!(engine.storage_stats().store.entry_count, 0);
    assert!(!output.exists());

    engine.wait();
}

#[test]
fn test_restart_requeues_interrupted_jobs() {
    let dir = TempDir::new().unwrap();

    // Run a job to completion, then rewrite its persisted row to look
    // like the process died mid-conversion.
    let job_id = {
        let engine = ConversionEngine::open_with(
            config(&dir, true),
            scripted_routes(),
            scripted_registry(),
        )
        .unwrap();
        let job_id = engine
            .submit(b"interrupted work", "i.txt", "TXT", "PDF")
            .unwrap();
        assert_eq!(wait_for(&engine, &job_id), JobStatus::Completed);
        engine.wait();
        job_id
    };

    {
        let db = omniconv::db::Database::open(&dir.path().join("jobs.db")).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE jobs SET status = 'converting', progress = 40, output_path = NULL,
                 method_used = NULL WHERE id = ?1",
                [&job_id],
            )?;
            Ok(())
        })
        .unwrap();
    }

    let engine = ConversionEngine::open_with(
        config(&dir, true),
        scripted_routes(),
        scripted_registry(),
    )
    .unwrap();

    // The interrupted job is reset and re-dispatched to completion.
    assert_eq!(wait_for(&engine, &job_id), JobStatus::Completed);
    let report = engine.status(&job_id).unwrap();
    assert_eq!(report.method_used.as_deref(), Some("text-render"));

    engine.wait();
}
