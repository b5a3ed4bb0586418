//! Merge module - Bilateral hemisphere merging
//!
//! Per subject: load resampled hemisphere files, pair and concatenate them
//! per acquisition, validate, then persist. Validation failures are logged
//! and recorded but never block writing.

mod loader;
mod merger;
mod persist;
mod validate;

pub use loader::{HemisphereLoader, LoadedSeries, SubjectData};
pub use merger::{merge_hemispheres, merge_pair, BilateralRecord};
pub use persist::{RecordMetadata, RecordWriter, SaveFormat, VALIDATION_FILE};
pub use validate::{
    validate_record, ValidationChecks, ValidationReport, ValidationResult, DEFAULT_VALUE_BOUND,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::batch::{SubjectJob, SubjectOutcome};
use crate::core::KeyScheme;
use crate::surface::SurfaceCodec;

/// Merge stage job: one call per subject
pub struct MergeJob {
    input_root: PathBuf,
    output_root: PathBuf,
    loader: HemisphereLoader,
    writer: RecordWriter,
    value_bound: f32,
}

impl MergeJob {
    pub fn new(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        scheme: KeyScheme,
        codec: Arc<dyn SurfaceCodec>,
        format: SaveFormat,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            loader: HemisphereLoader::new(scheme, Arc::clone(&codec)),
            writer: RecordWriter::new(format, codec),
            value_bound: DEFAULT_VALUE_BOUND,
        }
    }

    pub fn with_value_bound(mut self, bound: f32) -> Self {
        self.value_bound = bound;
        self
    }

    /// Load, merge, validate and write one subject; returns the records
    /// written and the validation report
    pub fn merge_subject(&self, subject: &str) -> Result<(Vec<BilateralRecord>, ValidationReport)> {
        let data = self.loader.load_subject(&self.input_root.join(subject))?;
        if data.is_empty() {
            anyhow::bail!("no resampled hemisphere files found");
        }

        let records = merge_hemispheres(self.loader.scheme(), &data);
        if records.is_empty() {
            anyhow::bail!("no complete left/right pairs among {} loaded file(s)", data.len());
        }

        let report = ValidationReport::build(subject, &records, self.value_bound);

        let out_dir = self.output_root.join(subject);
        for record in &records {
            self.writer
                .write_record(&out_dir, subject, record)
                .with_context(|| format!("Failed to save {}", record.name()))?;
        }
        self.writer.write_validation(&out_dir, &report)?;

        Ok((records, report))
    }
}

impl SubjectJob for MergeJob {
    fn stage(&self) -> &'static str {
        "merge"
    }

    fn input_root(&self) -> &Path {
        &self.input_root
    }

    fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn run_subject(&self, subject: &str) -> Result<SubjectOutcome> {
        let (records, report) = self.merge_subject(subject)?;

        tracing::info!(
            "[{}] merged {} acquisition(s){}",
            subject,
            records.len(),
            if report.all_valid { "" } else { ", some failed validation" }
        );

        // unpaired acquisitions are skipped, not failures
        Ok(SubjectOutcome::completed(subject, records.len(), records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::GiftiCodec;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, data: &Array2<f32>) {
        GiftiCodec::default()
            .write_timeseries(&dir.join(name), data.view(), &[])
            .unwrap();
    }

    #[test]
    fn test_record_with_nan_is_still_written() {
        let dir = tempdir().unwrap();
        let subject_dir = dir.path().join("in/100206");
        std::fs::create_dir_all(&subject_dir).unwrap();

        let mut left = Array2::from_elem((3, 4), 2.0f32);
        left[[1, 2]] = f32::NAN;
        let right = Array2::from_elem((3, 4), -2.0f32);
        write(&subject_dir, "rfMRI_REST1_LR_Atlas_hp2000_clean.L.3k_fsavg_L.func.gii", &left);
        write(&subject_dir, "rfMRI_REST1_LR_Atlas_hp2000_clean.R.3k_fsavg_R.func.gii", &right);

        let job = MergeJob::new(
            dir.path().join("in"),
            dir.path().join("out"),
            KeyScheme::resting_state(),
            Arc::new(GiftiCodec::default()),
            SaveFormat::Npy,
        );
        let (records, report) = job.merge_subject("100206").unwrap();
        assert_eq!(records.len(), 1);
        assert!(!report.all_valid);

        let result = &report.records["REST1_LR_bilateral"];
        assert_eq!(result.checks.failed(), vec!["no_nan"]);
        assert_eq!(result.data_range, Some([-2.0, 2.0]));

        let out = dir.path().join("out/100206");
        assert!(out.join("REST1_LR_bilateral.npy").is_file());
        assert!(out.join("REST1_LR_bilateral_metadata.json").is_file());

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(VALIDATION_FILE)).unwrap()).unwrap();
        let checks = &saved["records"]["REST1_LR_bilateral"]["checks"];
        assert_eq!(checks["no_nan"], false);
        for name in [
            "shape_valid",
            "no_inf",
            "vertices_match",
            "timepoints_positive",
            "vertices_positive",
            "reasonable_range",
        ] {
            assert_eq!(checks[name], true, "{}", name);
        }

        // the run still counts as a success
        let outcome = job.run_subject("100206").unwrap();
        assert!(outcome.is_success());
    }
}
