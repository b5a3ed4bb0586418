//! cortex-resample Library
//!
//! Resamples HCP surface time series from fs_LR 32k onto fsaverage4 and
//! merges the per-hemisphere results into bilateral records.
//!
//! # Features
//!
//! - **Restartable resampling**: files whose outputs exist are skipped
//! - **Parallel fan-out**: a fixed rayon pool over subjects, with panic
//!   isolation and partial-failure accounting
//! - **Atomic outputs**: every artifact is staged and renamed into place
//! - **Hemisphere merge**: pairing, truncation, validation and npy/GIFTI output
//!
//! # Example
//!
//! ```no_run
//! use cortex_resample::core::{PipelineEngine, ResampleSettings};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = ResampleSettings::new(
//!         PathBuf::from("/data/HCP_1200"),
//!         PathBuf::from("/data/HCP_fsaverage4"),
//!         PathBuf::from("/opt/standard_mesh_atlases"),
//!     );
//!
//!     let report = PipelineEngine::new().run_resample(&settings)?;
//!     println!("{}/{} subjects successful", report.successful.len(), report.total);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod fsio;
pub mod merge;
pub mod resample;
pub mod surface;
pub mod tool;
pub mod verify;

// Re-export commonly used types
pub use batch::{BatchReport, BatchScheduler, SubjectJob, SubjectOutcome, SubjectStatus};
pub use config::Config;
pub use core::{
    Acquisition, AcquisitionKey, DataKind, Discovery, Hemisphere, KeyScheme, MergeSettings,
    PipelineEngine, ResampleSettings, VerifySettings,
};
pub use error::{PipelineError, ToolError};
pub use merge::{BilateralRecord, MergeJob, SaveFormat};
pub use resample::{ResampleTask, ResampleWorker, TaskOutcome};
pub use surface::{GiftiCodec, SurfaceCodec, TimeSeries};
pub use tool::{AtlasMeshes, ResampleTool, WbCommand};
pub use verify::{OutputVerifier, VerifyReport};
