//! Error taxonomy for the resample/merge pipeline
//!
//! Only `MissingPrerequisite` and `DiscoveryEmpty` stop a run before any
//! subject is scheduled. Everything else is recovered at file or subject
//! granularity and ends up in a summary.

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline-level failures
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The external tool or an atlas reference file is not available
    #[error("Missing prerequisite: {what}\n  hint: {hint}")]
    MissingPrerequisite { what: String, hint: String },

    /// Discovery found nothing to process
    #[error("No subjects under {} contain files matching '{pattern}'", root.display())]
    DiscoveryEmpty { root: PathBuf, pattern: String },

    /// A source file could not be read during merging
    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// A subject worker panicked
    #[error("Worker for subject {subject} panicked: {message}")]
    WorkerPanic { subject: String, message: String },
}

impl PipelineError {
    /// Process exit code used by the binary for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::DiscoveryEmpty { .. } => 2,
            _ => 1,
        }
    }
}

/// A failed invocation of the external resampling tool
#[derive(Debug, Clone, Error)]
#[error("`{command}` failed ({}): {stderr}", describe_status(*code))]
pub struct ToolError {
    /// Rendered command line (program + subcommand)
    pub command: String,
    /// Exit code, `None` when the process was killed or never started
    pub code: Option<i32>,
    /// Captured standard error, trimmed
    pub stderr: String,
}

impl ToolError {
    pub fn spawn_failed(command: impl Into<String>, err: &std::io::Error) -> Self {
        Self {
            command: command.into(),
            code: None,
            stderr: format!("could not start process: {}", err),
        }
    }
}

fn describe_status(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "no exit code".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display() {
        let err = ToolError {
            command: "wb_command -metric-resample".to_string(),
            code: Some(255),
            stderr: "ERROR: sphere has wrong vertex count".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("exit code 255"));
        assert!(text.contains("wrong vertex count"));
    }

    #[test]
    fn test_exit_codes() {
        let empty = PipelineError::DiscoveryEmpty {
            root: PathBuf::from("/data"),
            pattern: "*.nii".to_string(),
        };
        assert_eq!(empty.exit_code(), 2);

        let missing = PipelineError::MissingPrerequisite {
            what: "wb_command".to_string(),
            hint: "install Connectome Workbench".to_string(),
        };
        assert_eq!(missing.exit_code(), 1);
    }
}
