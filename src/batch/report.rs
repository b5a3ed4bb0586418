//! Batch report - aggregate of one scheduler run

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SubjectOutcome;
use crate::core::SubjectId;
use crate::fsio;

/// A subject that did not fully succeed, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSubject {
    pub subject: SubjectId,
    pub reason: String,
}

/// Aggregated result of running one stage over all subjects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub stage: String,
    pub host: String,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub elapsed_secs: f64,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub jobs: usize,
    pub total: usize,
    pub successful: Vec<SubjectId>,
    pub failed: Vec<FailedSubject>,
    pub outcomes: Vec<SubjectOutcome>,

    #[serde(skip)]
    clock: Option<Instant>,
}

impl BatchReport {
    pub(super) fn start(stage: &str, input_root: &Path, output_root: &Path, jobs: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: stage.to_string(),
            host: host_label(),
            started_at: Local::now(),
            finished_at: None,
            elapsed_secs: 0.0,
            input_root: input_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            jobs,
            total: 0,
            successful: Vec::new(),
            failed: Vec::new(),
            outcomes: Vec::new(),
            clock: Some(Instant::now()),
        }
    }

    pub(super) fn record(&mut self, subject: SubjectId, result: Result<SubjectOutcome, String>) {
        match result {
            Ok(outcome) => {
                if outcome.is_success() {
                    self.successful.push(subject);
                } else {
                    self.failed.push(FailedSubject {
                        subject,
                        reason: outcome.describe(),
                    });
                }
                self.outcomes.push(outcome);
            }
            Err(reason) => self.failed.push(FailedSubject { subject, reason }),
        }
    }

    pub(super) fn finish(&mut self) {
        self.finished_at = Some(Local::now());
        if let Some(clock) = self.clock.take() {
            self.elapsed_secs = clock.elapsed().as_secs_f64();
        }
        self.successful.sort();
        self.failed.sort_by(|a, b| a.subject.cmp(&b.subject));
        self.outcomes.sort_by(|a, b| a.subject.cmp(&b.subject));
    }

    pub fn all_successful(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs.max(0.0))
    }

    /// Plain-text summary, also the content of the summary file
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let title = format!("{} batch summary", capitalize(&self.stage));

        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
        let _ = writeln!(out, "Run ID:   {}", self.run_id);
        let _ = writeln!(out, "Host:     {}", self.host);
        let _ = writeln!(out, "Started:  {}", self.started_at.format("%Y-%m-%d %H:%M:%S"));
        if let Some(finished) = self.finished_at {
            let _ = writeln!(out, "Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
        }
        let _ = writeln!(
            out,
            "Elapsed:  {}",
            humantime::format_duration(Duration::from_secs(self.elapsed().as_secs()))
        );
        let _ = writeln!(out, "Input:    {}", self.input_root.display());
        let _ = writeln!(out, "Output:   {}", self.output_root.display());
        let _ = writeln!(out, "Workers:  {}", self.jobs);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Result: {}/{} subjects successful",
            self.successful.len(),
            self.total
        );

        let _ = writeln!(out);
        let _ = writeln!(out, "Successful subjects ({}):", self.successful.len());
        for subject in &self.successful {
            let _ = writeln!(out, "  {}", subject);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Failed subjects ({}):", self.failed.len());
        for failed in &self.failed {
            let _ = writeln!(out, "  {}: {}", failed.subject, failed.reason);
        }

        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize batch report")
    }

    /// Write `{prefix}_{YYYYmmdd_HHMMSS}.txt` into `dir`
    pub fn write_summary(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        let stamp = self.started_at.format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.txt", prefix, stamp));
        fsio::write_atomic(&path, self.render_text().as_bytes())?;
        tracing::info!("Summary written to {}", path.display());
        Ok(path)
    }
}

fn host_label() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string());
    format!("{}@{}", whoami::username(), host)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
