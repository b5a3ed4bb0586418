//! Shared fixtures: a fake Workbench and on-disk HCP-like trees

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use cortex_resample::core::Hemisphere;
use cortex_resample::error::ToolError;
use cortex_resample::surface::{GiftiCodec, SurfaceCodec};
use cortex_resample::tool::{AtlasMeshes, ResampleRequest, ResampleTool, FSAVERAGE4_VERTICES};
use ndarray::Array2;

pub const TIMEPOINTS: usize = 4;
pub const REST1_LR: &str = "rfMRI_REST1_LR_Atlas_hp2000_clean.dtseries.nii";
pub const REST2_RL: &str = "rfMRI_REST2_RL_Atlas_hp2000_clean.dtseries.nii";

/// Stands in for wb_command: separation writes placeholders, resampling
/// writes a real GIFTI with the fsaverage4 vertex count
#[derive(Default)]
pub struct FakeWorkbench {
    pub separate_calls: AtomicUsize,
    pub resample_calls: AtomicUsize,
    /// Inputs whose path contains this substring fail to separate
    pub fail_on: Option<String>,
}

impl FakeWorkbench {
    pub fn failing_on(pattern: &str) -> Self {
        Self {
            fail_on: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.separate_calls.load(Ordering::SeqCst) + self.resample_calls.load(Ordering::SeqCst)
    }
}

impl ResampleTool for FakeWorkbench {
    fn separate(&self, combined: &Path, left: &Path, right: &Path) -> Result<(), ToolError> {
        self.separate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(pattern) = &self.fail_on {
            if combined.to_string_lossy().contains(pattern.as_str()) {
                return Err(ToolError {
                    command: "wb_command -cifti-separate".to_string(),
                    code: Some(255),
                    stderr: "ERROR: failed to read CIFTI header".to_string(),
                });
            }
        }
        fs::write(left, b"native left").expect("write native left");
        fs::write(right, b"native right").expect("write native right");
        Ok(())
    }

    fn resample(&self, request: &ResampleRequest<'_>) -> Result<(), ToolError> {
        self.resample_calls.fetch_add(1, Ordering::SeqCst);
        let offset = match request.hemisphere {
            Hemisphere::Left => 0.0,
            Hemisphere::Right => 100.0,
        };
        let data = Array2::from_shape_fn((TIMEPOINTS, FSAVERAGE4_VERTICES), |(t, v)| {
            offset + t as f32 + (v % 7) as f32 * 0.5
        });
        GiftiCodec::default()
            .write_timeseries(request.output, data.view(), &[])
            .expect("write resampled GIFTI");
        Ok(())
    }
}

/// Create every atlas reference file under `root`
pub fn make_atlas(root: &Path) -> PathBuf {
    let atlas_root = root.join("standard_mesh_atlases");
    let atlas = AtlasMeshes::fsaverage4(&atlas_root);
    fs::create_dir_all(atlas_root.join("resample_fsaverage")).unwrap();
    for h in Hemisphere::BOTH {
        let m = atlas.hemisphere(h);
        for p in [&m.current_sphere, &m.new_sphere, &m.current_area, &m.new_area] {
            fs::write(p, b"<GIFTI/>").unwrap();
        }
    }
    atlas_root
}

/// Create `{root}/{subject}/MNINonLinear/Results/{stem}/{file}` for each file
pub fn make_subject(root: &Path, subject: &str, files: &[&str]) {
    for file in files {
        let stem = file.split("_Atlas").next().unwrap_or(file);
        let dir = root.join(subject).join("MNINonLinear/Results").join(stem);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), b"fake cifti").unwrap();
    }
}

/// Names of entries directly inside `dir`, sorted
pub fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Contents of the single file in `dir` whose name starts with `prefix`
pub fn read_prefixed(dir: &Path, prefix: &str) -> String {
    let matches: Vec<String> = list(dir).into_iter().filter(|n| n.starts_with(prefix)).collect();
    assert_eq!(matches.len(), 1, "expected one {}* in {:?}", prefix, list(dir));
    fs::read_to_string(dir.join(&matches[0])).unwrap()
}
