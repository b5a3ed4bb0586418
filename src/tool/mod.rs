//! External resampling tool adapter
//!
//! The resampling math lives in Connectome Workbench. This module only
//! knows how to call it: one subprocess per step, exit code 0 is success,
//! anything else is a [`ToolError`] carrying the captured stderr.

mod atlas;

pub use atlas::{AtlasMeshes, HemisphereMeshes, FSAVERAGE4_VERTICES};

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::Hemisphere;
use crate::error::{PipelineError, ToolError};

/// Interpolation method token for area-preserving barycentric resampling
pub const AREA_METHOD: &str = "ADAP_BARY_AREA";

/// One metric resample call
#[derive(Debug, Clone, Copy)]
pub struct ResampleRequest<'a> {
    pub input: &'a Path,
    pub hemisphere: Hemisphere,
    pub meshes: &'a HemisphereMeshes,
    pub output: &'a Path,
}

/// The operations the pipeline needs from the external tool
pub trait ResampleTool: Send + Sync {
    /// Split a combined dense time series into per-hemisphere metric files
    fn separate(&self, combined: &Path, left: &Path, right: &Path) -> Result<(), ToolError>;

    /// Resample one hemisphere metric file onto the target mesh
    fn resample(&self, request: &ResampleRequest<'_>) -> Result<(), ToolError>;
}

/// `wb_command` invoked as a subprocess
#[derive(Debug, Clone)]
pub struct WbCommand {
    program: PathBuf,
}

impl Default for WbCommand {
    fn default() -> Self {
        Self::new("wb_command")
    }
}

impl WbCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `-version`; a missing binary is a fatal prerequisite failure
    pub fn check_available(&self) -> Result<String, PipelineError> {
        let output = Command::new(&self.program).arg("-version").output();

        match output {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .find(|l| l.to_ascii_lowercase().contains("version"))
                    .unwrap_or("unknown version")
                    .trim()
                    .to_string();
                tracing::info!("Using {} ({})", self.program.display(), version);
                Ok(version)
            }
            Ok(out) => Err(PipelineError::MissingPrerequisite {
                what: format!(
                    "{} -version exited with {}",
                    self.program.display(),
                    out.status
                ),
                hint: "check the Connectome Workbench installation".to_string(),
            }),
            Err(e) => Err(PipelineError::MissingPrerequisite {
                what: format!("{} ({})", self.program.display(), e),
                hint: "install Connectome Workbench and put wb_command on PATH, or pass --tool"
                    .to_string(),
            }),
        }
    }

    fn run(&self, subcommand: &str, args: Vec<OsString>) -> Result<(), ToolError> {
        let command = format!("{} {}", self.program.display(), subcommand);
        tracing::debug!("Running {} {:?}", command, args);

        let output = Command::new(&self.program)
            .arg(subcommand)
            .args(&args)
            .output()
            .map_err(|e| ToolError::spawn_failed(&command, &e))?;

        if output.status.success() {
            return Ok(());
        }

        Err(ToolError {
            command,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl ResampleTool for WbCommand {
    fn separate(&self, combined: &Path, left: &Path, right: &Path) -> Result<(), ToolError> {
        self.run(
            "-cifti-separate",
            vec![
                combined.into(),
                "COLUMN".into(),
                "-metric".into(),
                Hemisphere::Left.cortex_structure().into(),
                left.into(),
                "-metric".into(),
                Hemisphere::Right.cortex_structure().into(),
                right.into(),
            ],
        )
    }

    fn resample(&self, request: &ResampleRequest<'_>) -> Result<(), ToolError> {
        let meshes = request.meshes;
        self.run(
            "-metric-resample",
            vec![
                request.input.into(),
                meshes.current_sphere.as_os_str().into(),
                meshes.new_sphere.as_os_str().into(),
                AREA_METHOD.into(),
                request.output.into(),
                "-area-metrics".into(),
                meshes.current_area.as_os_str().into(),
                meshes.new_area.as_os_str().into(),
            ],
        )
    }
}
