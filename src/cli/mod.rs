//! CLI module - Command line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::core::DataKind;
use crate::merge::SaveFormat;

/// cortex-resample - HCP surface time series to fsaverage4
///
/// Resamples fs_LR 32k dense time series onto fsaverage4 with Connectome
/// Workbench, merges hemispheres into bilateral records and verifies outputs.
#[derive(Parser, Debug)]
#[command(name = "cortex-resample")]
#[command(version)]
#[command(about = "Resample HCP surface time series to fsaverage4 and merge hemispheres", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output (debug logging)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resample every subject from fs_LR 32k to fsaverage4
    Resample(ResampleArgs),

    /// Merge left/right resampled files into bilateral records
    Merge(MergeArgs),

    /// Check resampled outputs for completeness and vertex counts
    Verify(VerifyArgs),

    /// Create or show the configuration file
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct ResampleArgs {
    /// Input root with one directory per subject
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Output root for resampled files
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// standard_mesh_atlases directory
    #[arg(long, short)]
    pub atlas: Option<PathBuf>,

    /// Parallel workers (default: half the CPU cores)
    #[arg(long, short)]
    pub jobs: Option<usize>,

    /// Data kind to process
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// wb_command binary
    #[arg(long)]
    pub tool: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Report format printed at the end
    #[arg(long, value_enum, default_value = "human")]
    pub report: ReportFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct MergeArgs {
    /// Resampled output root (input of this stage)
    pub input: Option<PathBuf>,

    /// Bilateral output root
    pub output: Option<PathBuf>,

    /// Subjects to merge
    #[arg(long, short, num_args = 1.., conflicts_with = "all")]
    pub subjects: Vec<String>,

    /// Merge every subject found under the input root (default)
    #[arg(long)]
    pub all: bool,

    /// Matrix output format
    #[arg(long, short, value_enum)]
    pub format: Option<FormatArg>,

    /// Parallel workers (default: half the CPU cores)
    #[arg(long, short)]
    pub jobs: Option<usize>,

    /// Data kind (selects the acquisition key scheme)
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Report format printed at the end
    #[arg(long, value_enum, default_value = "human")]
    pub report: ReportFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct VerifyArgs {
    /// Resampled output root
    pub output: Option<PathBuf>,

    /// Only check these subjects
    #[arg(long, short, num_args = 1..)]
    pub subjects: Vec<String>,

    /// Report format
    #[arg(long, value_enum, default_value = "human")]
    pub report: ReportFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct ConfigArgs {
    /// Write a commented sample config if none exists
    #[arg(long)]
    pub init: bool,

    /// Print the effective configuration
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ReportFormat {
    /// Human readable (default)
    #[default]
    Human,
    /// JSON output
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    /// Resting-state fMRI (rfMRI_REST*)
    Rest,
    /// Task fMRI (tfMRI_*)
    Task,
}

impl From<KindArg> for DataKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Rest => DataKind::Rest,
            KindArg::Task => DataKind::Task,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// NumPy .npy
    Npy,
    /// GIFTI .func.gii
    Gifti,
    /// Both
    Both,
}

impl From<FormatArg> for SaveFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Npy => SaveFormat::Npy,
            FormatArg::Gifti => SaveFormat::Gifti,
            FormatArg::Both => SaveFormat::Both,
        }
    }
}
