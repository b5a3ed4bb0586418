//! PipelineEngine - Wires prerequisites, discovery and the scheduler
//!
//! Provides the three runnable stages: resample, merge and verify. All of
//! them are blocking; the binary runs them on a blocking thread.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::{DataKind, Discovery, KeyScheme, SubjectId, DEFAULT_MAX_DEPTH};
use crate::batch::{default_jobs, BatchReport, BatchScheduler};
use crate::error::PipelineError;
use crate::merge::{MergeJob, SaveFormat, DEFAULT_VALUE_BOUND};
use crate::resample::ResampleWorker;
use crate::surface::GiftiCodec;
use crate::tool::{AtlasMeshes, ResampleTool, WbCommand};
use crate::verify::{OutputVerifier, VerifyReport};

/// Glob for resampled hemisphere files, used to find subjects to merge
const RESAMPLED_GLOB: &str = "*.3k_fsavg_*.func.gii";

pub const BATCH_SUMMARY_PREFIX: &str = "batch_summary";
pub const MERGE_SUMMARY_PREFIX: &str = "merge_summary";

/// Inputs of the resample stage
#[derive(Debug, Clone)]
pub struct ResampleSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub atlas_dir: PathBuf,
    /// 0 = default pool size
    pub jobs: usize,
    pub kind: DataKind,
    pub tool: PathBuf,
    pub max_depth: usize,
    pub show_progress: bool,
}

impl ResampleSettings {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, atlas_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
            atlas_dir,
            jobs: 0,
            kind: DataKind::Rest,
            tool: PathBuf::from("wb_command"),
            max_depth: DEFAULT_MAX_DEPTH,
            show_progress: false,
        }
    }
}

/// Inputs of the merge stage
#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// Resampled output root (the resample stage's output_dir)
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// `None` = every subject with resampled files
    pub subjects: Option<Vec<SubjectId>>,
    pub jobs: usize,
    pub kind: DataKind,
    pub format: SaveFormat,
    pub value_bound: f32,
    pub show_progress: bool,
}

impl MergeSettings {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
            subjects: None,
            jobs: 0,
            kind: DataKind::Rest,
            format: SaveFormat::Npy,
            value_bound: DEFAULT_VALUE_BOUND,
            show_progress: false,
        }
    }
}

/// Inputs of the verify stage
#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub output_dir: PathBuf,
    pub subjects: Option<Vec<SubjectId>>,
}

/// Runs pipeline stages sharing one cancellation flag
#[derive(Debug, Clone, Default)]
pub struct PipelineEngine {
    cancel: Arc<AtomicBool>,
}

impl PipelineEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn scheduler(&self, jobs: usize, show_progress: bool) -> BatchScheduler {
        let jobs = if jobs == 0 { default_jobs() } else { jobs };
        BatchScheduler::new(jobs)
            .with_cancel_flag(self.cancel_flag())
            .with_progress(show_progress)
    }

    /// Resample with `wb_command`, checking it is installed first
    pub fn run_resample(&self, settings: &ResampleSettings) -> Result<BatchReport> {
        let tool = WbCommand::new(&settings.tool);
        tool.check_available()?;
        self.run_resample_with(settings, Arc::new(tool))
    }

    /// Resample with any tool implementation
    pub fn run_resample_with(
        &self,
        settings: &ResampleSettings,
        tool: Arc<dyn ResampleTool>,
    ) -> Result<BatchReport> {
        let atlas = AtlasMeshes::fsaverage4(&settings.atlas_dir);
        atlas.verify()?;

        let discovery = Discovery::new(&settings.input_dir, settings.kind.source_glob())?
            .with_max_depth(settings.max_depth);
        let subjects = discovery.find_subjects()?;
        if subjects.is_empty() {
            return Err(PipelineError::DiscoveryEmpty {
                root: settings.input_dir.clone(),
                pattern: discovery.pattern().to_string(),
            }
            .into());
        }

        std::fs::create_dir_all(&settings.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", settings.output_dir.display())
        })?;

        tracing::info!(
            "Resampling {} data of {} subject(s) to fsaverage4",
            settings.kind.label(),
            subjects.len()
        );

        let worker = ResampleWorker::new(
            discovery,
            &settings.output_dir,
            tool,
            Arc::new(atlas),
            settings.kind,
        );
        let report = self
            .scheduler(settings.jobs, settings.show_progress)
            .run(Arc::new(worker), &subjects)?;

        report.write_summary(&settings.output_dir, BATCH_SUMMARY_PREFIX)?;
        Ok(report)
    }

    /// Merge resampled hemispheres into bilateral records
    pub fn run_merge(&self, settings: &MergeSettings) -> Result<BatchReport> {
        let subjects = match &settings.subjects {
            Some(list) if !list.is_empty() => list.clone(),
            _ => Discovery::new(&settings.input_dir, RESAMPLED_GLOB)?
                .with_max_depth(1)
                .find_subjects()?,
        };
        if subjects.is_empty() {
            return Err(PipelineError::DiscoveryEmpty {
                root: settings.input_dir.clone(),
                pattern: RESAMPLED_GLOB.to_string(),
            }
            .into());
        }

        std::fs::create_dir_all(&settings.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", settings.output_dir.display())
        })?;

        let job = MergeJob::new(
            &settings.input_dir,
            &settings.output_dir,
            KeyScheme::for_kind(settings.kind),
            Arc::new(GiftiCodec::default()),
            settings.format,
        )
        .with_value_bound(settings.value_bound);

        let report = self
            .scheduler(settings.jobs, settings.show_progress)
            .run(Arc::new(job), &subjects)?;

        report.write_summary(&settings.output_dir, MERGE_SUMMARY_PREFIX)?;
        Ok(report)
    }

    /// Check resampled outputs against the target mesh
    pub fn run_verify(&self, settings: &VerifySettings) -> Result<VerifyReport> {
        // only the target mesh identity is needed, not the atlas files
        let atlas = AtlasMeshes::fsaverage4(PathBuf::new());
        let verifier = OutputVerifier::new(
            &settings.output_dir,
            &atlas,
            Arc::new(GiftiCodec::default()),
        );

        let subjects = match &settings.subjects {
            Some(list) if !list.is_empty() => list.clone(),
            _ => verifier.subjects()?,
        };
        if subjects.is_empty() {
            return Err(PipelineError::DiscoveryEmpty {
                root: settings.output_dir.clone(),
                pattern: "*/".to_string(),
            }
            .into());
        }

        Ok(verifier.verify_all(&subjects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tool::ResampleRequest;
    use std::path::Path;
    use tempfile::tempdir;

    struct NeverCalled;

    impl ResampleTool for NeverCalled {
        fn separate(&self, _: &Path, _: &Path, _: &Path) -> Result<(), ToolError> {
            panic!("tool must not run");
        }

        fn resample(&self, _: &ResampleRequest<'_>) -> Result<(), ToolError> {
            panic!("tool must not run");
        }
    }

    fn downcast(err: &anyhow::Error) -> &PipelineError {
        err.downcast_ref::<PipelineError>()
            .unwrap_or_else(|| panic!("not a PipelineError: {:#}", err))
    }

    #[test]
    fn test_missing_atlas_aborts_before_discovery() {
        let dir = tempdir().unwrap();
        let settings = ResampleSettings::new(
            dir.path().join("does-not-exist"),
            dir.path().join("out"),
            dir.path().join("atlas"),
        );

        let err = PipelineEngine::new()
            .run_resample_with(&settings, Arc::new(NeverCalled))
            .unwrap_err();
        assert!(matches!(downcast(&err), PipelineError::MissingPrerequisite { .. }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_empty_discovery_exits_cleanly() {
        let dir = tempdir().unwrap();
        let atlas = AtlasMeshes::fsaverage4(dir.path().join("atlas"));
        std::fs::create_dir_all(dir.path().join("atlas/resample_fsaverage")).unwrap();
        for h in crate::core::Hemisphere::BOTH {
            let m = atlas.hemisphere(h);
            for p in [&m.current_sphere, &m.new_sphere, &m.current_area, &m.new_area] {
                std::fs::write(p, b"gii").unwrap();
            }
        }
        std::fs::create_dir_all(dir.path().join("in/100206")).unwrap();

        let settings = ResampleSettings::new(
            dir.path().join("in"),
            dir.path().join("out"),
            dir.path().join("atlas"),
        );
        let err = PipelineEngine::new()
            .run_resample_with(&settings, Arc::new(NeverCalled))
            .unwrap_err();
        let pe = downcast(&err);
        assert!(matches!(pe, PipelineError::DiscoveryEmpty { .. }));
        assert_eq!(pe.exit_code(), 2);
    }

    #[test]
    fn test_verify_without_subjects_is_empty_discovery() {
        let dir = tempdir().unwrap();
        let err = PipelineEngine::new()
            .run_verify(&VerifySettings {
                output_dir: dir.path().to_path_buf(),
                subjects: None,
            })
            .unwrap_err();
        assert!(matches!(downcast(&err), PipelineError::DiscoveryEmpty { .. }));
    }
}
