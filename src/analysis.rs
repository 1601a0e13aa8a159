//! Analysis runner: log every branch, resolve each revision, aggregate.
//!
//! At most one run is active per [`AnalysisEngine`]. A second start while
//! one is in flight is rejected with [`SvnStatError::AnalysisRunning`], not
//! queued. Progress and the final results are published through two
//! independently locked records that callers poll with
//! [`status`](AnalysisEngine::status) and [`results`](AnalysisEngine::results).
//!
//! Revisions are resolved sequentially by default. With `jobs > 1` they are
//! spread over scoped worker threads; results are applied back in revision
//! order, so the output does not depend on the job count.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Result, SvnStatError};
use crate::stats::{
    AnalysisResults, Commit, Filter, aggregate, commits_from_log, filter_by_date, merge_commits,
};
use crate::svn::cache::RevisionCache;
use crate::svn::resolve::{DiffResult, resolve_revision};
use crate::svn::{Credentials, DateFilter, SvnClient, validate_revision_range};

// ─── Request / status types ─────────────────────────────────────────

/// One branch URL to analyze, with the credentials used for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub url: String,
    #[serde(default, skip_serializing)]
    pub credentials: Credentials,
}

/// Parameters of one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub branches: Vec<BranchSpec>,
    /// Passed to `svn log -r` as given.
    pub revision_range: Option<String>,
    /// Inclusive `YYYY-MM-DD` bounds applied after logging.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Worker threads for revision resolution. 0 means one per CPU.
    pub jobs: usize,
}

impl AnalysisRequest {
    /// Check arguments up front so a bad request never occupies the runner.
    pub fn validate(&self) -> Result<DateFilter> {
        if self.branches.is_empty() {
            return Err(SvnStatError::InvalidArgs(
                "At least one branch URL is required".to_string(),
            ));
        }
        if let Some(b) = self.branches.iter().find(|b| b.url.trim().is_empty()) {
            return Err(SvnStatError::InvalidArgs(format!(
                "Empty branch URL in request: {:?}",
                b.url
            )));
        }
        if let Some(range) = &self.revision_range {
            validate_revision_range(range)?;
        }
        DateFilter::parse(self.start_date.as_deref(), self.end_date.as_deref())
    }

    fn filter(&self) -> Filter {
        Filter {
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            revision_range: self.revision_range.clone(),
        }
    }

    fn worker_count(&self, revisions: usize) -> usize {
        let jobs = if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        };
        jobs.clamp(1, revisions.max(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Info,
    Warn,
    Error,
}

/// One line of the per-run audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionDetail {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: DetailLevel,
}

/// Progress of the current (or last) run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub running: bool,
    /// 0..=100.
    pub progress: u8,
    pub message: String,
    pub completed: bool,
    pub error: Option<String>,
    pub execution_details: Vec<ExecutionDetail>,
}

impl TaskStatus {
    /// Details at `level`, for summaries.
    pub fn details_at(&self, level: DetailLevel) -> impl Iterator<Item = &ExecutionDetail> {
        self.execution_details.iter().filter(move |d| d.level == level)
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

const PROGRESS_LOGGED: u8 = 10;
const PROGRESS_RESOLVED: u8 = 90;

/// Owns the svn client, the revision cache and the shared run records.
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AnalysisEngine {
    client: Arc<dyn SvnClient>,
    cache: Arc<RevisionCache>,
    status: Arc<RwLock<TaskStatus>>,
    results: Arc<RwLock<Option<AnalysisResults>>>,
    running: Arc<AtomicBool>,
}

impl AnalysisEngine {
    pub fn new(client: Arc<dyn SvnClient>, cache: Arc<RevisionCache>) -> Self {
        Self {
            client,
            cache,
            status: Arc::new(RwLock::new(TaskStatus::default())),
            results: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the status record.
    pub fn status(&self) -> TaskStatus {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of the last successful run's results.
    pub fn results(&self) -> Option<AnalysisResults> {
        self.results.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Start a run on a detached thread. The handle is only for callers that
    /// want to wait; dropping it is fine.
    pub fn start(&self, request: AnalysisRequest) -> Result<JoinHandle<()>> {
        let date_filter = request.validate()?;
        self.acquire()?;

        let engine = self.clone();
        Ok(std::thread::spawn(move || {
            // Outcome is published through the status record.
            let _ = engine.execute(&request, &date_filter);
        }))
    }

    /// Run to completion on the calling thread, under the same single-flight
    /// rule as [`start`](Self::start).
    pub fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResults> {
        let date_filter = request.validate()?;
        self.acquire()?;
        self.execute(request, &date_filter)
    }

    fn acquire(&self) -> Result<()> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SvnStatError::AnalysisRunning)?;
        *self.write_status() = TaskStatus {
            running: true,
            message: "Starting analysis".to_string(),
            ..TaskStatus::default()
        };
        Ok(())
    }

    /// Body of a run. Caller must hold the running flag; it is released here
    /// on every path, panics included.
    fn execute(&self, request: &AnalysisRequest, date_filter: &DateFilter) -> Result<AnalysisResults> {
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.pipeline(request, date_filter)))
            .unwrap_or_else(|panic| {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(SvnStatError::AnalysisPanicked(msg))
            });

        match &outcome {
            Ok(results) => {
                *self.results.write().unwrap_or_else(|e| e.into_inner()) = Some(results.clone());
                let mut status = self.write_status();
                status.progress = 100;
                status.completed = true;
                status.message = format!(
                    "Analysis complete: {} commits, +{} -{}",
                    results.total_commits, results.total_lines_added, results.total_lines_deleted
                );
                info!(
                    commits = results.total_commits,
                    elapsed_ms = format_args!("{:.1}", start.elapsed().as_secs_f64() * 1000.0),
                    "Analysis complete"
                );
            }
            Err(e) => {
                error!(error = %e, "Analysis failed");
                let mut status = self.write_status();
                status.error = Some(e.to_string());
                status.message = "Analysis failed".to_string();
                push_detail(&mut status, DetailLevel::Error, e.to_string());
            }
        }

        self.write_status().running = false;
        self.running.store(false, Ordering::Release);
        outcome
    }

    fn pipeline(&self, request: &AnalysisRequest, date_filter: &DateFilter) -> Result<AnalysisResults> {
        let commits = self.collect_commits(request)?;
        let commits = filter_by_date(commits, date_filter);
        if commits.is_empty() {
            return Err(SvnStatError::NoCommits);
        }
        self.detail(
            DetailLevel::Info,
            format!("{} revisions to resolve", commits.len()),
        );

        let commits = self.resolve_all(request, commits);

        self.set_progress(PROGRESS_RESOLVED, "Aggregating");
        Ok(aggregate(commits, request.filter()))
    }

    /// Log every branch. A failing branch is skipped; all of them failing is
    /// terminal.
    fn collect_commits(&self, request: &AnalysisRequest) -> Result<Vec<Commit>> {
        let total = request.branches.len();
        let mut batches = Vec::with_capacity(total);
        let mut last_error = None;

        for (i, branch) in request.branches.iter().enumerate() {
            self.set_progress(
                (i * PROGRESS_LOGGED as usize / total) as u8,
                &format!("Fetching log for {}", branch.url),
            );
            match self.client.fetch_log(
                &branch.url,
                &branch.credentials,
                request.revision_range.as_deref(),
            ) {
                Ok(entries) => {
                    self.detail(
                        DetailLevel::Info,
                        format!("{} log entries from {}", entries.len(), branch.url),
                    );
                    batches.push(commits_from_log(&entries, &branch.url));
                }
                Err(e) => {
                    self.detail(
                        DetailLevel::Error,
                        format!("Failed to fetch log for {}: {}", branch.url, e),
                    );
                    last_error = Some(e);
                }
            }
        }

        if batches.is_empty() {
            return Err(last_error.unwrap_or(SvnStatError::NoCommits));
        }
        Ok(merge_commits(batches))
    }

    /// Attach line counts to every commit. A revision that fails keeps zero
    /// counts and leaves an error detail behind.
    fn resolve_all(&self, request: &AnalysisRequest, mut commits: Vec<Commit>) -> Vec<Commit> {
        let credentials: HashMap<&str, &Credentials> = request
            .branches
            .iter()
            .map(|b| (b.url.as_str(), &b.credentials))
            .collect();
        let empty = Credentials::default();
        let total = commits.len();
        let workers = request.worker_count(total);
        let done = AtomicUsize::new(0);

        let resolve_one = |commit: &Commit| -> Result<DiffResult> {
            let creds = credentials
                .get(commit.branch_url.as_str())
                .copied()
                .unwrap_or(&empty);
            let result = resolve_revision(
                self.client.as_ref(),
                &self.cache,
                &commit.branch_url,
                &commit.revision,
                creds,
            );
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            let span = (PROGRESS_RESOLVED - PROGRESS_LOGGED) as usize;
            self.set_progress(
                PROGRESS_LOGGED + (n * span / total) as u8,
                &format!("Resolved revision {} ({}/{})", commit.revision, n, total),
            );
            result
        };

        let outcomes: Vec<Result<DiffResult>> = if workers <= 1 {
            commits.iter().map(resolve_one).collect()
        } else {
            info!(workers, revisions = total, "Resolving revisions in parallel");
            let chunk_size = total.div_ceil(workers);
            std::thread::scope(|s| {
                let handles: Vec<_> = commits
                    .chunks(chunk_size.max(1))
                    .map(|chunk| {
                        let resolve_one = &resolve_one;
                        s.spawn(move || chunk.iter().map(resolve_one).collect::<Vec<_>>())
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| match h.join() {
                        Ok(results) => results,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            })
        };

        for (commit, outcome) in commits.iter_mut().zip(outcomes) {
            match outcome {
                Ok(diff) => {
                    if let Some(e) = &diff.save_error {
                        self.detail(
                            DetailLevel::Warn,
                            format!("Revision {} not persisted to cache: {}", commit.revision, e),
                        );
                    }
                    commit.apply_diff(diff);
                }
                Err(e) => {
                    warn!(revision = %commit.revision, error = %e, "Revision resolution failed");
                    self.detail(
                        DetailLevel::Error,
                        format!("Failed to resolve revision {}: {}", commit.revision, e),
                    );
                }
            }
        }
        commits
    }

    // ─── Status helpers ─────────────────────────────────────────────

    fn write_status(&self) -> std::sync::RwLockWriteGuard<'_, TaskStatus> {
        self.status.write().unwrap_or_else(|e| e.into_inner())
    }

    fn set_progress(&self, progress: u8, message: &str) {
        let mut status = self.write_status();
        status.progress = progress.min(100);
        status.message = message.to_string();
    }

    fn detail(&self, level: DetailLevel, message: String) {
        match level {
            DetailLevel::Info => info!("{}", message),
            DetailLevel::Warn => warn!("{}", message),
            DetailLevel::Error => error!("{}", message),
        }
        push_detail(&mut self.write_status(), level, message);
    }
}

fn push_detail(status: &mut TaskStatus, level: DetailLevel, message: String) {
    status.execution_details.push(ExecutionDetail {
        timestamp: Utc::now(),
        message,
        level,
    });
}

#[cfg(test)]
#[path = "analysis_tests.rs"]
mod tests;
