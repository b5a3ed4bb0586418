//! Hemisphere loader - read a subject's resampled files by acquisition key

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::{is_in_flight_artifact, AcquisitionKey, KeyScheme};
use crate::error::PipelineError;
use crate::surface::{SurfaceCodec, TimeSeries};

/// One loaded hemisphere file
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub timeseries: TimeSeries,
    pub filename: String,
}

/// Everything loaded for one subject, keyed by acquisition + hemisphere
pub type SubjectData = BTreeMap<AcquisitionKey, LoadedSeries>;

pub struct HemisphereLoader {
    scheme: KeyScheme,
    codec: Arc<dyn SurfaceCodec>,
}

impl HemisphereLoader {
    pub fn new(scheme: KeyScheme, codec: Arc<dyn SurfaceCodec>) -> Self {
        Self { scheme, codec }
    }

    pub fn scheme(&self) -> &KeyScheme {
        &self.scheme
    }

    /// Load every classifiable surface file in `subject_dir`.
    ///
    /// Unreadable files and second files for an already-loaded key are
    /// logged and skipped. A missing directory is an error.
    pub fn load_subject(&self, subject_dir: &Path) -> Result<SubjectData> {
        if !subject_dir.is_dir() {
            anyhow::bail!("Subject directory not found: {}", subject_dir.display());
        }

        let suffix = format!(".{}", self.codec.extension());
        let mut names: Vec<String> = std::fs::read_dir(subject_dir)
            .with_context(|| format!("Failed to read {}", subject_dir.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(&suffix) && !is_in_flight_artifact(name))
            .collect();
        names.sort();

        let mut data = SubjectData::new();
        for name in names {
            let Some(key) = self.scheme.classify(&name) else {
                tracing::debug!("No acquisition key for {}", name);
                continue;
            };

            if let Some(existing) = data.get(key) {
                tracing::warn!(
                    "{} also matches {} (already loaded from {}), ignoring",
                    name,
                    key,
                    existing.filename
                );
                continue;
            }

            let path = subject_dir.join(&name);
            match self.codec.read_timeseries(&path) {
                Ok(timeseries) => {
                    tracing::debug!("Loaded {} as {} {:?}", name, key, timeseries.dim());
                    data.insert(
                        key.clone(),
                        LoadedSeries {
                            timeseries,
                            filename: name,
                        },
                    );
                }
                Err(e) => {
                    let err = PipelineError::Load {
                        path,
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", err);
                }
            }
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Acquisition, Hemisphere};
    use crate::surface::GiftiCodec;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, rows: usize, cols: usize) {
        let data = Array2::from_elem((rows, cols), 1.0f32);
        GiftiCodec::default()
            .write_timeseries(&dir.join(name), data.view(), &[])
            .unwrap();
    }

    fn loader() -> HemisphereLoader {
        HemisphereLoader::new(KeyScheme::resting_state(), Arc::new(GiftiCodec::default()))
    }

    #[test]
    fn test_loads_and_classifies() {
        let dir = tempdir().unwrap();
        write(dir.path(), "rfMRI_REST1_LR_Atlas_hp2000_clean.L.3k_fsavg_L.func.gii", 4, 3);
        write(dir.path(), "rfMRI_REST1_LR_Atlas_hp2000_clean.R.3k_fsavg_R.func.gii", 4, 3);
        write(dir.path(), "unrelated.func.gii", 4, 3);
        std::fs::write(dir.path().join("processing_summary.txt"), "x").unwrap();

        let data = loader().load_subject(dir.path()).unwrap();
        assert_eq!(data.len(), 2);
        let left = &data[&Acquisition::new("REST1", "LR").key(Hemisphere::Left)];
        assert_eq!(left.timeseries.dim(), (4, 3));
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = tempdir().unwrap();
        write(dir.path(), "rfMRI_REST2_RL_Atlas_hp2000_clean.L.3k_fsavg_L.func.gii", 2, 2);
        std::fs::write(
            dir.path().join("rfMRI_REST2_RL_Atlas_hp2000_clean.R.3k_fsavg_R.func.gii"),
            "garbage",
        )
        .unwrap();

        let data = loader().load_subject(dir.path()).unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_duplicate_key_keeps_first() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a_REST1_RL_x.L.func.gii", 2, 2);
        write(dir.path(), "b_REST1_RL_y.L.func.gii", 5, 2);

        let data = loader().load_subject(dir.path()).unwrap();
        let entry = &data[&Acquisition::new("REST1", "RL").key(Hemisphere::Left)];
        assert_eq!(entry.filename, "a_REST1_RL_x.L.func.gii");
        assert_eq!(entry.timeseries.nrows(), 2);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempdir().unwrap();
        assert!(loader().load_subject(&dir.path().join("nope")).is_err());
    }
}
