//! Resample module - Per-file separate → resample → cleanup
//!
//! A [`ResampleTask`] is created for every discovered source file and run
//! once. If both hemisphere outputs already exist the task is a no-op, which
//! makes an interrupted batch safe to restart.

mod worker;

pub use worker::{FileRecord, ResampleWorker, SUBJECT_SUMMARY_FILE};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::{source_basename, Hemisphere};
use crate::fsio;
use crate::tool::{AtlasMeshes, ResampleRequest, ResampleTool};

/// Terminal state of one resample task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Both outputs were present; no tool call was made
    AlreadyDone,
    Failed(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TaskOutcome::Failed(_))
    }

    pub fn message(&self) -> String {
        match self {
            TaskOutcome::Success => "Successfully resampled".to_string(),
            TaskOutcome::AlreadyDone => "Already processed".to_string(),
            TaskOutcome::Failed(reason) => reason.clone(),
        }
    }
}

/// One source file and every path it will touch
#[derive(Debug, Clone)]
pub struct ResampleTask {
    input: PathBuf,
    output_dir: PathBuf,
    native: [PathBuf; 2],
    outputs: [PathBuf; 2],
}

fn slot(hemisphere: Hemisphere) -> usize {
    match hemisphere {
        Hemisphere::Left => 0,
        Hemisphere::Right => 1,
    }
}

impl ResampleTask {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, atlas: &AtlasMeshes) -> Self {
        let input = input.into();
        let output_dir = output_dir.into();
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let base = source_basename(&file_name).to_string();

        let native = Hemisphere::BOTH
            .map(|h| output_dir.join(format!("temp_{}.{}.32k.func.gii", base, h.letter())));
        let outputs = Hemisphere::BOTH.map(|h| output_dir.join(atlas.output_name(&base, h)));

        Self {
            input,
            output_dir,
            native,
            outputs,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn file_name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// Final resampled path for a hemisphere
    pub fn output(&self, hemisphere: Hemisphere) -> &Path {
        &self.outputs[slot(hemisphere)]
    }

    /// Native-mesh intermediate for a hemisphere
    pub fn native(&self, hemisphere: Hemisphere) -> &Path {
        &self.native[slot(hemisphere)]
    }

    pub fn is_done(&self) -> bool {
        self.outputs.iter().all(|p| p.is_file())
    }

    /// Run the task to a terminal outcome. Never panics on tool failure and
    /// never leaves intermediates behind.
    pub fn run(&self, tool: &dyn ResampleTool, atlas: &AtlasMeshes) -> TaskOutcome {
        if self.is_done() {
            tracing::debug!("{} already resampled, skipping", self.file_name());
            return TaskOutcome::AlreadyDone;
        }

        match self.execute(tool, atlas) {
            Ok(()) => {
                self.remove_intermediates();
                tracing::debug!("Resampled {}", self.file_name());
                TaskOutcome::Success
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!("Resampling {} failed: {}", self.file_name(), reason);
                self.remove_all();
                TaskOutcome::Failed(reason)
            }
        }
    }

    fn execute(&self, tool: &dyn ResampleTool, atlas: &AtlasMeshes) -> Result<()> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.output_dir.display())
        })?;

        tracing::debug!("Separating {}", self.file_name());
        tool.separate(
            &self.input,
            self.native(Hemisphere::Left),
            self.native(Hemisphere::Right),
        )?;

        for hemisphere in Hemisphere::BOTH {
            let output = self.output(hemisphere);
            let staging = fsio::staging_path(output);

            tracing::debug!("Resampling {} hemisphere of {}", hemisphere, self.file_name());
            tool.resample(&ResampleRequest {
                input: self.native(hemisphere),
                hemisphere,
                meshes: atlas.hemisphere(hemisphere),
                output: &staging,
            })?;

            fs::rename(&staging, output)
                .with_context(|| format!("Failed to move {} into place", output.display()))?;
        }

        Ok(())
    }

    fn remove_intermediates(&self) {
        for path in &self.native {
            fsio::remove_if_exists(path);
        }
    }

    fn remove_all(&self) {
        self.remove_intermediates();
        for path in &self.outputs {
            fsio::remove_if_exists(&fsio::staging_path(path));
            fsio::remove_if_exists(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Writes placeholder files; optionally fails the right-hemisphere resample
    #[derive(Default)]
    struct ScriptedTool {
        calls: AtomicUsize,
        fail_right: bool,
    }

    impl ResampleTool for ScriptedTool {
        fn separate(&self, _combined: &Path, left: &Path, right: &Path) -> Result<(), ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(left, b"native L").unwrap();
            fs::write(right, b"native R").unwrap();
            Ok(())
        }

        fn resample(&self, request: &ResampleRequest<'_>) -> Result<(), ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(request.output, b"partial").unwrap();
            if self.fail_right && request.hemisphere == Hemisphere::Right {
                return Err(ToolError {
                    command: "wb_command -metric-resample".to_string(),
                    code: Some(1),
                    stderr: "ERROR: mesh mismatch".to_string(),
                });
            }
            Ok(())
        }
    }

    fn setup() -> (tempfile::TempDir, PathBuf, AtlasMeshes) {
        let dir = tempdir().unwrap();
        let input = dir.path().join("rfMRI_REST1_LR_Atlas_hp2000_clean.dtseries.nii");
        fs::write(&input, b"cifti").unwrap();
        let atlas = AtlasMeshes::fsaverage4(dir.path().join("atlas"));
        (dir, input, atlas)
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_success_produces_both_outputs() {
        let (dir, input, atlas) = setup();
        let out = dir.path().join("out");
        let tool = ScriptedTool::default();

        let task = ResampleTask::new(&input, &out, &atlas);
        assert_eq!(task.run(&tool, &atlas), TaskOutcome::Success);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);

        let mut names = leftovers(&out);
        names.sort();
        assert_eq!(
            names,
            vec![
                "rfMRI_REST1_LR_Atlas_hp2000_clean.L.3k_fsavg_L.func.gii",
                "rfMRI_REST1_LR_Atlas_hp2000_clean.R.3k_fsavg_R.func.gii",
            ]
        );
    }

    #[test]
    fn test_rerun_makes_no_tool_calls() {
        let (dir, input, atlas) = setup();
        let out = dir.path().join("out");
        let task = ResampleTask::new(&input, &out, &atlas);
        for h in Hemisphere::BOTH {
            fs::create_dir_all(&out).unwrap();
            fs::write(task.output(h), b"done").unwrap();
        }

        let tool = ScriptedTool::default();
        assert_eq!(task.run(&tool, &atlas), TaskOutcome::AlreadyDone);
        assert_eq!(task.run(&tool, &atlas), TaskOutcome::AlreadyDone);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_cleans_up_everything() {
        let (dir, input, atlas) = setup();
        let out = dir.path().join("out");
        let tool = ScriptedTool {
            fail_right: true,
            ..Default::default()
        };

        let task = ResampleTask::new(&input, &out, &atlas);
        match task.run(&tool, &atlas) {
            TaskOutcome::Failed(reason) => assert!(reason.contains("mesh mismatch")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(leftovers(&out).is_empty(), "left behind: {:?}", leftovers(&out));
    }

    #[test]
    fn test_one_missing_output_reruns_task() {
        let (dir, input, atlas) = setup();
        let out = dir.path().join("out");
        let task = ResampleTask::new(&input, &out, &atlas);
        fs::create_dir_all(&out).unwrap();
        fs::write(task.output(Hemisphere::Left), b"done").unwrap();

        let tool = ScriptedTool::default();
        assert_eq!(task.run(&tool, &atlas), TaskOutcome::Success);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
    }
}
