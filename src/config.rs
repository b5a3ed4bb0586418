//! Configuration Module - Pipeline defaults from config.toml
//!
//! Every field has a default, so an empty or partial file is valid.
//! Command-line flags override whatever is loaded here.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::DataKind;
use crate::merge::{SaveFormat, DEFAULT_VALUE_BOUND};

/// cortex-resample configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub paths: PathsConfig,
    pub resample: ResampleConfig,
    pub merge: MergeConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Directory layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root holding one directory per subject with native-mesh data
    pub input_dir: Option<PathBuf>,
    /// Root receiving resampled per-hemisphere files
    pub output_dir: Option<PathBuf>,
    /// `standard_mesh_atlases` directory
    pub atlas_dir: Option<PathBuf>,
    /// Root receiving merged bilateral records
    pub bilateral_dir: Option<PathBuf>,
}

/// Resample stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Worker threads (0 = half the logical cores)
    pub jobs: usize,
    pub data_kind: DataKind,
    /// Path or name of the wb_command binary
    pub tool: PathBuf,
    /// Search depth below each subject directory
    pub max_depth: usize,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            data_kind: DataKind::Rest,
            tool: PathBuf::from("wb_command"),
            max_depth: crate::core::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Merge stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Worker threads (0 = half the logical cores)
    pub jobs: usize,
    pub formats: SaveFormat,
    /// Magnitude bound used by the `reasonable_range` check
    pub value_bound: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            formats: SaveFormat::Npy,
            value_bound: DEFAULT_VALUE_BOUND,
        }
    }
}

impl Config {
    /// Load an explicit config file, or the default one if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        crate::fsio::write_atomic(path, content.as_bytes())
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "cortex-resample", "cortex-resample")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".cortex-resample")
                    .join("config.toml")
            })
    }

    /// Write the commented sample config unless a file is already there
    pub fn init_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        crate::fsio::write_atomic(path, generate_sample_config().as_bytes())
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        tracing::info!("Created sample config at {}", path.display());
        Ok(true)
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    r#"# cortex-resample configuration
# Location: ~/.config/cortex-resample/config.toml (platform config dir)
# Every value can be overridden on the command line.

[general]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
log_level = "info"

[paths]
# Subject directories with native-mesh data, e.g. /data/HCP_1200
# input_dir = "/data/HCP_1200"

# Resampled per-hemisphere outputs
# output_dir = "/data/HCP_fsaverage4"

# Connectome Workbench standard_mesh_atlases directory
# atlas_dir = "/opt/HCPpipelines/global/templates/standard_mesh_atlases"

# Merged bilateral records
# bilateral_dir = "/data/HCP_fsaverage4_bilateral"

[resample]
# Worker threads (0 = half the logical cores)
jobs = 0

# "rest" for rfMRI_REST*, "task" for tfMRI_* runs
data_kind = "rest"

# wb_command binary (name on PATH or absolute path)
tool = "wb_command"

# How deep to search below each subject directory
max_depth = 4

[merge]
# Worker threads (0 = half the logical cores)
jobs = 0

# Matrix output: "npy", "gifti" or "both"
formats = "npy"

# Values with magnitude at or above this fail the range check
value_bound = 1000.0
"#
    .to_string()
}
