//! Subject worker - runs every file of one subject through a ResampleTask

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;

use super::ResampleTask;
use crate::batch::{SubjectJob, SubjectOutcome};
use crate::core::{DataKind, Discovery};
use crate::fsio;
use crate::tool::{AtlasMeshes, ResampleTool};

/// Per-subject summary written next to the resampled files
pub const SUBJECT_SUMMARY_FILE: &str = "processing_summary.txt";

/// Result of one file inside a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub filename: String,
    pub success: bool,
    pub message: String,
}

/// Resample stage job: one call per subject
pub struct ResampleWorker {
    discovery: Discovery,
    output_root: PathBuf,
    tool: Arc<dyn ResampleTool>,
    atlas: Arc<AtlasMeshes>,
    kind: DataKind,
}

impl ResampleWorker {
    pub fn new(
        discovery: Discovery,
        output_root: impl Into<PathBuf>,
        tool: Arc<dyn ResampleTool>,
        atlas: Arc<AtlasMeshes>,
        kind: DataKind,
    ) -> Self {
        Self {
            discovery,
            output_root: output_root.into(),
            tool,
            atlas,
            kind,
        }
    }

    /// Resample all files of a subject, sequentially
    pub fn process_subject(&self, subject: &str) -> Result<(Vec<FileRecord>, PathBuf)> {
        let files = self.discovery.subject_files(subject);
        let out_dir = self.output_root.join(subject);
        if files.is_empty() {
            return Ok((Vec::new(), out_dir));
        }

        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;

        let mut records = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            let task = ResampleTask::new(file, &out_dir, &self.atlas);
            tracing::debug!(
                "[{}] file {}/{}: {}",
                subject,
                i + 1,
                files.len(),
                task.file_name()
            );

            let outcome = task.run(self.tool.as_ref(), &self.atlas);
            records.push(FileRecord {
                filename: task.file_name(),
                success: outcome.is_success(),
                message: outcome.message(),
            });
        }

        Ok((records, out_dir))
    }

    fn write_summary(&self, subject: &str, out_dir: &Path, records: &[FileRecord]) -> Result<()> {
        let text = render_subject_summary(subject, self.kind, records);
        fsio::write_atomic(&out_dir.join(SUBJECT_SUMMARY_FILE), text.as_bytes())
    }
}

impl SubjectJob for ResampleWorker {
    fn stage(&self) -> &'static str {
        "resample"
    }

    fn input_root(&self) -> &Path {
        self.discovery.root()
    }

    fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn run_subject(&self, subject: &str) -> Result<SubjectOutcome> {
        let (records, out_dir) = self.process_subject(subject)?;
        if records.is_empty() {
            tracing::warn!("[{}] No {} data found", subject, self.kind.label());
            return Ok(SubjectOutcome::no_data(subject));
        }

        self.write_summary(subject, &out_dir, &records)?;

        let succeeded = records.iter().filter(|r| r.success).count();
        tracing::info!("[{}] {}/{} files resampled", subject, succeeded, records.len());
        Ok(SubjectOutcome::completed(subject, succeeded, records.len()))
    }
}

/// Human-readable per-subject summary
pub fn render_subject_summary(subject: &str, kind: DataKind, records: &[FileRecord]) -> String {
    let succeeded = records.iter().filter(|r| r.success).count();
    let mut out = String::new();

    let _ = writeln!(out, "Processing Summary for Subject {}", subject);
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out, "Data: {}", kind.label());
    let _ = writeln!(out, "Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Succeeded: {}/{}", succeeded, records.len());
    let _ = writeln!(out);

    for record in records {
        let mark = if record.success { "✓" } else { "✗" };
        let _ = writeln!(out, "{} {}: {}", mark, record.filename, record.message);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SubjectStatus;
    use crate::error::ToolError;
    use crate::tool::ResampleRequest;
    use std::fs;
    use tempfile::tempdir;

    struct FailOnRest2;

    impl ResampleTool for FailOnRest2 {
        fn separate(&self, combined: &Path, left: &Path, right: &Path) -> Result<(), ToolError> {
            if combined.to_string_lossy().contains("REST2") {
                return Err(ToolError {
                    command: "wb_command -cifti-separate".to_string(),
                    code: Some(1),
                    stderr: "corrupt CIFTI".to_string(),
                });
            }
            fs::write(left, b"L").unwrap();
            fs::write(right, b"R").unwrap();
            Ok(())
        }

        fn resample(&self, request: &ResampleRequest<'_>) -> Result<(), ToolError> {
            fs::write(request.output, b"out").unwrap();
            Ok(())
        }
    }

    fn worker(root: &Path) -> ResampleWorker {
        let discovery = Discovery::new(root.join("in"), DataKind::Rest.source_glob()).unwrap();
        ResampleWorker::new(
            discovery,
            root.join("out"),
            Arc::new(FailOnRest2),
            Arc::new(AtlasMeshes::fsaverage4(root.join("atlas"))),
            DataKind::Rest,
        )
    }

    #[test]
    fn test_partial_subject_summary() {
        let dir = tempdir().unwrap();
        let subject_dir = dir.path().join("in/100206");
        fs::create_dir_all(&subject_dir).unwrap();
        fs::write(subject_dir.join("rfMRI_REST1_LR_Atlas_hp2000_clean.dtseries.nii"), b"x").unwrap();
        fs::write(subject_dir.join("rfMRI_REST2_LR_Atlas_hp2000_clean.dtseries.nii"), b"x").unwrap();

        let outcome = worker(dir.path()).run_subject("100206").unwrap();
        assert_eq!(outcome.status, SubjectStatus::Completed);
        assert_eq!((outcome.success_count, outcome.total_count), (1, 2));
        assert!(!outcome.is_success());

        let summary = fs::read_to_string(dir.path().join("out/100206").join(SUBJECT_SUMMARY_FILE)).unwrap();
        assert!(summary.contains("Succeeded: 1/2"));
        assert!(summary.contains("✓ rfMRI_REST1_LR_Atlas_hp2000_clean.dtseries.nii"));
        assert!(summary.contains("✗ rfMRI_REST2_LR_Atlas_hp2000_clean.dtseries.nii"));
        assert!(summary.contains("corrupt CIFTI"));
    }

    #[test]
    fn test_subject_without_files_is_no_data() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("in/100307")).unwrap();

        let outcome = worker(dir.path()).run_subject("100307").unwrap();
        assert_eq!(outcome.status, SubjectStatus::NoDataFound);
        assert_eq!(outcome.total_count, 0);
        assert!(!dir.path().join("out/100307").join(SUBJECT_SUMMARY_FILE).exists());
    }
}
