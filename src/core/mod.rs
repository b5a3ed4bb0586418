//! Core module - Shared data model, discovery and the pipeline engine
//!
//! Contains subject discovery, acquisition key classification and the
//! engine that wires the stages together.

mod engine;
mod keys;
mod scanner;

pub use engine::{
    MergeSettings, PipelineEngine, ResampleSettings, VerifySettings, BATCH_SUMMARY_PREFIX,
    MERGE_SUMMARY_PREFIX,
};
pub use keys::{KeyPattern, KeyScheme, HCP_TASKS};
pub use scanner::{is_in_flight_artifact, Discovery, DEFAULT_MAX_DEPTH};

use serde::{Deserialize, Serialize};

/// Opaque subject identifier (the subject directory name)
pub type SubjectId = String;

/// Cortical hemisphere
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    pub const BOTH: [Hemisphere; 2] = [Hemisphere::Left, Hemisphere::Right];

    /// Single-letter tag used in file names
    pub fn letter(&self) -> &'static str {
        match self {
            Hemisphere::Left => "L",
            Hemisphere::Right => "R",
        }
    }

    /// CIFTI structure name passed to the separation command
    pub fn cortex_structure(&self) -> &'static str {
        match self {
            Hemisphere::Left => "CORTEX_LEFT",
            Hemisphere::Right => "CORTEX_RIGHT",
        }
    }
}

impl std::fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Which family of acquisitions a run operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Resting-state fMRI (REST1/REST2 × LR/RL)
    #[default]
    Rest,
    /// Task fMRI runs (tfMRI_<TASK>_<RUN>)
    Task,
}

impl DataKind {
    /// File name glob for native-mesh source files
    pub fn source_glob(&self) -> &'static str {
        match self {
            DataKind::Rest => "rfMRI_REST*_Atlas_hp2000_clean.dtseries.nii",
            DataKind::Task => "tfMRI_*_Atlas*.dtseries.nii",
        }
    }

    /// Human-readable label for summaries
    pub fn label(&self) -> &'static str {
        match self {
            DataKind::Rest => "resting-state",
            DataKind::Task => "task-fMRI",
        }
    }
}

impl std::str::FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rest" | "resting" | "rfmri" => Ok(DataKind::Rest),
            "task" | "tfmri" => Ok(DataKind::Task),
            other => Err(format!("unknown data kind '{}' (expected rest or task)", other)),
        }
    }
}

/// One acquisition: (session or task, phase-encoding run)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Acquisition {
    pub session: String,
    pub phase: String,
}

impl Acquisition {
    pub fn new(session: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            phase: phase.into(),
        }
    }

    /// e.g. `REST1_LR`
    pub fn name(&self) -> String {
        format!("{}_{}", self.session, self.phase)
    }

    /// Name of the merged record, e.g. `REST1_LR_bilateral`
    pub fn bilateral_name(&self) -> String {
        format!("{}_bilateral", self.name())
    }

    pub fn key(&self, hemisphere: Hemisphere) -> AcquisitionKey {
        AcquisitionKey {
            acquisition: self.clone(),
            hemisphere,
        }
    }
}

/// Acquisition plus hemisphere; what a single resampled file holds
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AcquisitionKey {
    pub acquisition: Acquisition,
    pub hemisphere: Hemisphere,
}

impl AcquisitionKey {
    /// e.g. `REST1_LR_L`
    pub fn label(&self) -> String {
        format!("{}_{}", self.acquisition.name(), self.hemisphere)
    }
}

impl std::fmt::Display for AcquisitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Strip the `.dtseries.nii` suffix from a source file name
pub fn source_basename(file_name: &str) -> &str {
    file_name
        .strip_suffix(".dtseries.nii")
        .or_else(|| file_name.strip_suffix(".nii"))
        .unwrap_or(file_name)
}
