//! Persistence of merged records
//!
//! Every file is staged and renamed into place, so a rerun replaces old
//! outputs wholesale and an interrupted run never leaves half a matrix.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray_npy::WriteNpyExt;
use serde::{Deserialize, Serialize};

use super::merger::BilateralRecord;
use super::validate::ValidationReport;
use crate::fsio;
use crate::surface::SurfaceCodec;

pub const VALIDATION_FILE: &str = "validation_results.json";

/// Which matrix formats to write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Npy,
    Gifti,
    Both,
}

impl SaveFormat {
    pub fn npy(&self) -> bool {
        matches!(self, SaveFormat::Npy | SaveFormat::Both)
    }

    pub fn gifti(&self) -> bool {
        matches!(self, SaveFormat::Gifti | SaveFormat::Both)
    }
}

impl std::str::FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "npy" | "numpy" => Ok(SaveFormat::Npy),
            "gifti" | "gii" => Ok(SaveFormat::Gifti),
            "both" => Ok(SaveFormat::Both),
            other => Err(format!("unknown save format '{}' (expected npy, gifti or both)", other)),
        }
    }
}

/// Sidecar metadata for one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub filename: String,
    pub subject_id: String,
    pub acquisition: String,
    pub shape: [usize; 2],
    pub dtype: String,
    pub n_timepoints: usize,
    pub n_vertices_left: usize,
    pub n_vertices_right: usize,
    pub n_vertices_total: usize,
    pub left_source: String,
    pub right_source: String,
    pub merged_at: String,
    /// blake3 of the little-endian f32 matrix bytes, row-major
    pub data_blake3: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<String>,
}

impl RecordMetadata {
    pub fn new(subject: &str, record: &BilateralRecord, filename: &str) -> Self {
        let (timepoints, vertices) = record.timeseries.dim();
        Self {
            filename: filename.to_string(),
            subject_id: subject.to_string(),
            acquisition: record.acquisition.name(),
            shape: [timepoints, vertices],
            dtype: "float32".to_string(),
            n_timepoints: timepoints,
            n_vertices_left: record.n_vertices_left,
            n_vertices_right: record.n_vertices_right,
            n_vertices_total: vertices,
            left_source: record.left_source.clone(),
            right_source: record.right_source.clone(),
            merged_at: record.merged_at.to_rfc3339(),
            data_blake3: digest(record),
            truncation: record.truncated_from.map(|(l, r)| {
                format!("truncated to {} timepoints (L={}, R={})", timepoints, l, r)
            }),
        }
    }
}

fn digest(record: &BilateralRecord) -> String {
    let mut hasher = blake3::Hasher::new();
    for v in record.timeseries.iter() {
        hasher.update(&v.to_le_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Writes merged records for one subject directory
pub struct RecordWriter {
    format: SaveFormat,
    codec: Arc<dyn SurfaceCodec>,
}

impl RecordWriter {
    pub fn new(format: SaveFormat, codec: Arc<dyn SurfaceCodec>) -> Self {
        Self { format, codec }
    }

    /// Write the matrix file(s) plus metadata; returns every path written
    pub fn write_record(
        &self,
        out_dir: &Path,
        subject: &str,
        record: &BilateralRecord,
    ) -> Result<Vec<PathBuf>> {
        let name = record.name();
        let mut written = Vec::new();
        let mut primary: Option<String> = None;

        if self.format.npy() {
            let path = out_dir.join(format!("{}.npy", name));
            fsio::write_atomic_with(&path, |w| {
                record
                    .timeseries
                    .write_npy(w)
                    .with_context(|| format!("Failed to encode {}", path.display()))
            })?;
            primary.get_or_insert_with(|| file_name(&path));
            written.push(path);
        }

        if self.format.gifti() {
            let path = out_dir.join(format!("{}.{}", name, self.codec.extension()));
            let meta = vec![
                ("SubjectID".to_string(), subject.to_string()),
                ("Acquisition".to_string(), name.clone()),
                ("LeftSource".to_string(), record.left_source.clone()),
                ("RightSource".to_string(), record.right_source.clone()),
                (
                    "VertexCounts".to_string(),
                    format!("{},{}", record.n_vertices_left, record.n_vertices_right),
                ),
            ];
            self.codec
                .write_timeseries(&path, record.timeseries.view(), &meta)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            primary.get_or_insert_with(|| file_name(&path));
            written.push(path);
        }

        let metadata = RecordMetadata::new(subject, record, primary.as_deref().unwrap_or(&name));
        let meta_path = out_dir.join(format!("{}_metadata.json", name));
        write_json(&meta_path, &metadata)?;
        written.push(meta_path);

        let bytes: u64 = written
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        tracing::debug!(
            "[{}] wrote {} file(s) for {} ({})",
            subject,
            written.len(),
            name,
            humansize::format_size(bytes, humansize::BINARY)
        );
        Ok(written)
    }

    pub fn write_validation(&self, out_dir: &Path, report: &ValidationReport) -> Result<PathBuf> {
        let path = out_dir.join(VALIDATION_FILE);
        write_json(&path, report)?;
        Ok(path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    fsio::write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Acquisition;
    use crate::surface::GiftiCodec;
    use chrono::Local;
    use ndarray::Array2;
    use ndarray_npy::read_npy;
    use tempfile::tempdir;

    fn record() -> BilateralRecord {
        BilateralRecord {
            acquisition: Acquisition::new("REST1", "LR"),
            timeseries: Array2::from_shape_fn((3, 4), |(t, v)| (t * 4 + v) as f32),
            n_vertices_left: 2,
            n_vertices_right: 2,
            left_source: "x.L.func.gii".to_string(),
            right_source: "x.R.func.gii".to_string(),
            merged_at: Local::now(),
            truncated_from: Some((4, 3)),
        }
    }

    #[test]
    fn test_write_npy_and_metadata() {
        let dir = tempdir().unwrap();
        let writer = RecordWriter::new(SaveFormat::Npy, Arc::new(GiftiCodec::default()));
        let rec = record();

        let written = writer.write_record(dir.path(), "100206", &rec).unwrap();
        assert_eq!(written.len(), 2);

        let back: Array2<f32> = read_npy(dir.path().join("REST1_LR_bilateral.npy")).unwrap();
        assert_eq!(back, rec.timeseries);

        let meta: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("REST1_LR_bilateral_metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta["filename"], "REST1_LR_bilateral.npy");
        assert_eq!(meta["shape"], serde_json::json!([3, 4]));
        assert_eq!(meta["n_vertices_total"], 4);
        assert_eq!(meta["data_blake3"].as_str().unwrap().len(), 64);
        assert!(meta["truncation"].as_str().unwrap().contains("L=4, R=3"));
    }

    #[test]
    fn test_both_formats() {
        let dir = tempdir().unwrap();
        let codec = Arc::new(GiftiCodec::default());
        let writer = RecordWriter::new(SaveFormat::Both, codec.clone());

        writer.write_record(dir.path(), "100206", &record()).unwrap();

        assert!(dir.path().join("REST1_LR_bilateral.npy").is_file());
        let gii = codec
            .read_timeseries(&dir.path().join("REST1_LR_bilateral.func.gii"))
            .unwrap();
        assert_eq!(gii, record().timeseries);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let dir = tempdir().unwrap();
        let writer = RecordWriter::new(SaveFormat::Npy, Arc::new(GiftiCodec::default()));
        let path = dir.path().join("REST1_LR_bilateral.npy");

        writer.write_record(dir.path(), "100206", &record()).unwrap();
        let first = std::fs::read(&path).unwrap();
        writer.write_record(dir.path(), "100206", &record()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("BOTH".parse::<SaveFormat>().unwrap(), SaveFormat::Both);
        assert!("hdf5".parse::<SaveFormat>().is_err());
    }
}
