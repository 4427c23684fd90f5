//! Walks a job's strategy fallback chain: first success wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info_span, warn};

use crate::broadcast::JobProgressEvent;
use crate::dispatch::progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
use crate::error::StrategyError;
use crate::job::{JobRecord, JobStore};
use crate::routing::{RoutingTable, StrategyId};
use crate::store::ContentStore;
use crate::strategy::{executor, ConversionRequest, StrategyRegistry};

/// Terminal result of one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A strategy succeeded and the job is completed.
    Completed,
    /// The job reached its terminal error state.
    Failed,
    /// The job was deleted while work was in flight; whatever was
    /// produced has been discarded. A normal outcome, not a fault.
    Discarded,
}

/// Executes the dispatch algorithm for one job at a time. Shared by all
/// pool workers; holds no per-job state.
pub struct Dispatcher {
    routing: Arc<RoutingTable>,
    registry: Arc<StrategyRegistry>,
    jobs: Arc<JobStore>,
    content: Arc<ContentStore>,
    output_dir: PathBuf,
    work_dir: PathBuf,
    strategy_timeout: Duration,
    progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        routing: Arc<RoutingTable>,
        registry: Arc<StrategyRegistry>,
        jobs: Arc<JobStore>,
        content: Arc<ContentStore>,
        output_dir: PathBuf,
        work_dir: PathBuf,
        strategy_timeout: Duration,
        progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
    ) -> Self {
        Self {
            routing,
            registry,
            jobs,
            content,
            output_dir,
            work_dir,
            strategy_timeout,
            progress_sender,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Runs a job from `pending` to a terminal state. Tolerates the job
    /// having been deleted at any point; never panics on missing state.
    pub fn dispatch(&self, job_id: &str) -> DispatchOutcome {
        let _span = info_span!("dispatch", job_id = %job_id).entered();

        let Some(job) = self.jobs.get(job_id) else {
            log::debug!("Job {} vanished before dispatch began", job_id);
            return DispatchOutcome::Discarded;
        };

        let reporter: Box<dyn ProgressReporter> = match &self.progress_sender {
            Some(sender) => Box::new(BroadcastProgress::for_job(&job, Arc::clone(sender))),
            None => Box::new(NoopProgress),
        };

        self.run(&job, reporter.as_ref())
    }

    fn run(&self, job: &JobRecord, progress: &dyn ProgressReporter) -> DispatchOutcome {
        // Resolve the chain before any work. An unsupported pair is a
        // structural error: no strategy is attempted.
        let strategies: Vec<StrategyId> = match self
            .routing
            .strategies_for(job.source_format, job.destination_format)
        {
            Ok(chain) => chain.to_vec(),
            Err(e) => {
                let message = e.to_string();
                if self.jobs.fail(&job.id, &message) {
                    progress.report(ProgressEvent::Failed { error: message });
                    return DispatchOutcome::Failed;
                }
                return DispatchOutcome::Discarded;
            }
        };

        if !self.jobs.mark_converting(&job.id) {
            return DispatchOutcome::Discarded;
        }
        progress.report(ProgressEvent::Started);

        let staged_input = match self.stage_input(job) {
            Ok(path) => path,
            Err(message) => {
                warn!("Failed to stage input for job {}: {}", job.id, message);
                if self.jobs.fail(&job.id, &message) {
                    progress.report(ProgressEvent::Failed { error: message });
                    return DispatchOutcome::Failed;
                }
                return DispatchOutcome::Discarded;
            }
        };

        let output = self
            .output_dir
            .join(format!("{}.{}", job.id, job.destination_format.extension()));
        let request = ConversionRequest {
            input: staged_input.clone(),
            output: output.clone(),
            source: job.source_format,
            destination: job.destination_format,
        };

        let total = strategies.len();
        let mut failures: Vec<(StrategyId, StrategyError)> = Vec::new();

        for (index, id) in strategies.iter().enumerate() {
            let attempted_pct = (100 * (index + 1) / total) as u8;

            let Some(strategy) = self.registry.get(*id) else {
                // A routed strategy without an implementation behaves
                // like a missing tool and the chain moves on.
                failures.push((*id, StrategyError::ToolMissing(id.as_str().to_string())));
                self.jobs.set_progress(&job.id, attempted_pct);
                continue;
            };

            progress.report(ProgressEvent::Attempt {
                strategy: *id,
                attempt: index + 1,
                total,
                progress: (100 * index / total) as u8,
            });

            match executor::execute(strategy, &request, self.strategy_timeout) {
                Ok(()) => {
                    self.discard_staged(&staged_input);
                    if self.jobs.complete(&job.id, &output, *id) {
                        log::info!(
                            "Job {} completed via {} ({} -> {})",
                            job.id,
                            id,
                            job.source_format,
                            job.destination_format
                        );
                        progress.report(ProgressEvent::Completed {
                            strategy: *id,
                            output_path: output.display().to_string(),
                        });
                        return DispatchOutcome::Completed;
                    }
                    // Deleted mid-conversion: the attempt was allowed to
                    // finish, its result is discarded.
                    log::debug!("Job {} deleted mid-conversion, discarding result", job.id);
                    let _ = std::fs::remove_file(&output);
                    return DispatchOutcome::Discarded;
                }
                Err(e) => {
                    log::warn!("Job {}: strategy {} failed: {}", job.id, id, e);
                    progress.report(ProgressEvent::AttemptFailed {
                        strategy: *id,
                        error: e.to_string(),
                        progress: attempted_pct,
                    });
                    failures.push((*id, e));
                    self.jobs.set_progress(&job.id, attempted_pct);
                }
            }

            // A deleted job stops the chain early; remaining strategies
            // would only produce artifacts nobody wants.
            if self.jobs.get(&job.id).is_none() {
                self.discard_staged(&staged_input);
                return DispatchOutcome::Discarded;
            }
        }

        self.discard_staged(&staged_input);

        let summary = summarize_failures(&failures);
        if self.jobs.fail(&job.id, &summary) {
            progress.report(ProgressEvent::Failed { error: summary });
            return DispatchOutcome::Failed;
        }
        DispatchOutcome::Discarded
    }

    /// Materializes the content-store bytes under a name carrying the
    /// declared source extension, since most tools sniff by extension.
    /// Hard link when possible, copy across filesystems.
    fn stage_input(&self, job: &JobRecord) -> Result<PathBuf, String> {
        let source = self
            .content
            .path_of(&job.input_hash)
            .map_err(|e| format!("input content unavailable: {e}"))?;

        std::fs::create_dir_all(&self.work_dir)
            .map_err(|e| format!("failed to create work directory: {e}"))?;

        let staged = self
            .work_dir
            .join(format!("{}.{}", job.id, job.source_format.extension()));
        if staged.exists() {
            let _ = std::fs::remove_file(&staged);
        }
        std::fs::hard_link(&source, &staged)
            .or_else(|_| std::fs::copy(&source, &staged).map(|_| ()))
            .map_err(|e| format!("failed to stage input: {e}"))?;
        Ok(staged)
    }

    fn discard_staged(&self, staged: &Path) {
        if let Err(e) = std::fs::remove_file(staged) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove staged input {}: {}", staged.display(), e);
            }
        }
    }
}

fn summarize_failures(failures: &[(StrategyId, StrategyError)]) -> String {
    let attempts: Vec<String> = failures
        .iter()
        .map(|(id, error)| format!("{id}: {error}"))
        .collect();
    format!(
        "all {} conversion strategies failed: {}",
        failures.len(),
        attempts.join("; ")
    )
}
