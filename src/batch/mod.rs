//! Batch module - Fan a subject job out over a worker pool
//!
//! Every subject is submitted up front to a fixed-size rayon pool. Workers
//! send results back over a crossbeam channel as they finish; aggregation
//! happens on the calling thread. A panicking subject is caught and recorded
//! as failed without disturbing the rest of the pool.

mod report;

pub use report::{BatchReport, FailedSubject};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::core::SubjectId;
use crate::error::PipelineError;

/// How a subject job ended (when it did not error or panic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectStatus {
    Completed,
    NoDataFound,
    Cancelled,
}

/// Per-subject result returned by a [`SubjectJob`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectOutcome {
    pub subject: SubjectId,
    pub success_count: usize,
    pub total_count: usize,
    pub status: SubjectStatus,
}

impl SubjectOutcome {
    pub fn completed(subject: &str, success_count: usize, total_count: usize) -> Self {
        Self {
            subject: subject.to_string(),
            success_count: success_count.min(total_count),
            total_count,
            status: SubjectStatus::Completed,
        }
    }

    pub fn no_data(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            success_count: 0,
            total_count: 0,
            status: SubjectStatus::NoDataFound,
        }
    }

    pub fn cancelled(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            success_count: 0,
            total_count: 0,
            status: SubjectStatus::Cancelled,
        }
    }

    /// Completed with every item succeeding
    pub fn is_success(&self) -> bool {
        self.status == SubjectStatus::Completed && self.success_count == self.total_count
    }

    /// Short reason used in the failed-subject list
    pub fn describe(&self) -> String {
        match self.status {
            SubjectStatus::Completed => format!(
                "{}/{} items succeeded",
                self.success_count, self.total_count
            ),
            SubjectStatus::NoDataFound => "no data found".to_string(),
            SubjectStatus::Cancelled => "cancelled before start".to_string(),
        }
    }
}

/// Work applied once per subject by the scheduler
pub trait SubjectJob: Send + Sync + 'static {
    /// Stage name used in logs and the summary file name
    fn stage(&self) -> &'static str;

    fn input_root(&self) -> &Path;

    /// Directory that receives the batch summary
    fn output_root(&self) -> &Path;

    fn run_subject(&self, subject: &str) -> Result<SubjectOutcome>;
}

/// Default pool size: half the logical cores, at least one
pub fn default_jobs() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Fixed-size parallel runner for subject jobs
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    jobs: usize,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(default_jobs())
    }
}

impl BatchScheduler {
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs: jobs.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    /// Share an externally owned cancellation flag (set from a signal handler)
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run `job` for every subject and aggregate the results.
    ///
    /// Returns an error only when the pool itself cannot be built; subject
    /// failures of any kind end up in the report.
    pub fn run<J: SubjectJob>(&self, job: Arc<J>, subjects: &[SubjectId]) -> Result<BatchReport> {
        let stage = job.stage();
        let mut report = BatchReport::start(stage, job.input_root(), job.output_root(), self.jobs);
        report.total = subjects.len();

        tracing::info!(
            "Starting {} of {} subject(s) with {} worker(s)",
            stage,
            subjects.len(),
            self.jobs
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(move |i| format!("{}-worker-{}", stage, i))
            .build()
            .context("Failed to build worker pool")?;

        let (tx, rx) = crossbeam_channel::unbounded::<(SubjectId, Result<SubjectOutcome, String>)>();

        for subject in subjects {
            let tx = tx.clone();
            let job = Arc::clone(&job);
            let cancel = Arc::clone(&self.cancel);
            let subject = subject.clone();

            pool.spawn(move || {
                let result = if cancel.load(Ordering::SeqCst) {
                    Ok(SubjectOutcome::cancelled(&subject))
                } else {
                    run_isolated(job.as_ref(), &subject)
                };
                // receiver lives until every sender is gone
                let _ = tx.send((subject, result));
            });
        }
        drop(tx);

        let progress = progress_bar(subjects.len(), self.show_progress, stage);
        for (subject, result) in rx.iter() {
            match &result {
                Ok(outcome) if outcome.is_success() => {
                    tracing::info!("✓ {} ({}/{})", subject, outcome.success_count, outcome.total_count);
                }
                Ok(outcome) => {
                    tracing::warn!("✗ {}: {}", subject, outcome.describe());
                }
                Err(reason) => {
                    tracing::error!("✗ {}: {}", subject, reason);
                }
            }
            progress.set_message(subject.clone());
            progress.inc(1);
            report.record(subject, result);
        }
        progress.finish_and_clear();

        report.finish();
        tracing::info!(
            "{} finished: {}/{} subjects successful",
            stage,
            report.successful.len(),
            report.total
        );
        Ok(report)
    }
}

/// Run one subject, converting errors and panics into a failure reason
fn run_isolated<J: SubjectJob>(job: &J, subject: &str) -> Result<SubjectOutcome, String> {
    match catch_unwind(AssertUnwindSafe(|| job.run_subject(subject))) {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(PipelineError::WorkerPanic {
            subject: subject.to_string(),
            message: panic_message(payload.as_ref()),
        }
        .to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn progress_bar(len: usize, visible: bool, stage: &str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░"),
    );
    pb.set_prefix(stage.to_string());
    pb
}
