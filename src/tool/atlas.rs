//! Atlas reference meshes for fs_LR 32k -> fsaverage4 resampling

use std::path::{Path, PathBuf};

use crate::core::Hemisphere;
use crate::error::PipelineError;

/// Vertices per hemisphere on the fsaverage4 mesh
pub const FSAVERAGE4_VERTICES: usize = 2562;

/// Sphere and vertex-area files for one hemisphere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HemisphereMeshes {
    pub current_sphere: PathBuf,
    pub new_sphere: PathBuf,
    pub current_area: PathBuf,
    pub new_area: PathBuf,
}

impl HemisphereMeshes {
    fn files(&self) -> [&Path; 4] {
        [
            &self.current_sphere,
            &self.new_sphere,
            &self.current_area,
            &self.new_area,
        ]
    }
}

/// Reference meshes for both hemispheres plus the target mesh identity
#[derive(Debug, Clone)]
pub struct AtlasMeshes {
    root: PathBuf,
    left: HemisphereMeshes,
    right: HemisphereMeshes,
    /// Tag used in output names, e.g. `3k_fsavg` in `*.L.3k_fsavg_L.func.gii`
    target_tag: String,
    target_vertices: usize,
}

impl AtlasMeshes {
    /// Standard `standard_mesh_atlases/resample_fsaverage` layout
    pub fn fsaverage4(atlas_root: impl Into<PathBuf>) -> Self {
        let root = atlas_root.into();
        let dir = root.join("resample_fsaverage");
        let meshes = |h: &str| HemisphereMeshes {
            current_sphere: dir.join(format!("fs_LR-deformed_to-fsaverage.{}.sphere.32k_fs_LR.surf.gii", h)),
            new_sphere: dir.join(format!("fsaverage4_std_sphere.{}.3k_fsavg_{}.surf.gii", h, h)),
            current_area: dir.join(format!("fs_LR.{}.midthickness_va_avg.32k_fs_LR.shape.gii", h)),
            new_area: dir.join(format!("fsaverage4.{}.midthickness_va_avg.3k_fsavg_{}.shape.gii", h, h)),
        };

        Self {
            left: meshes("L"),
            right: meshes("R"),
            root,
            target_tag: "3k_fsavg".to_string(),
            target_vertices: FSAVERAGE4_VERTICES,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hemisphere(&self, hemisphere: Hemisphere) -> &HemisphereMeshes {
        match hemisphere {
            Hemisphere::Left => &self.left,
            Hemisphere::Right => &self.right,
        }
    }

    pub fn target_tag(&self) -> &str {
        &self.target_tag
    }

    pub fn target_vertices(&self) -> usize {
        self.target_vertices
    }

    /// Final resampled file name for a source basename
    pub fn output_name(&self, basename: &str, hemisphere: Hemisphere) -> String {
        let h = hemisphere.letter();
        format!("{}.{}.{}_{}.func.gii", basename, h, self.target_tag, h)
    }

    /// Every sphere and area file must exist before any subject runs
    pub fn verify(&self) -> Result<(), PipelineError> {
        let missing: Vec<String> = Hemisphere::BOTH
            .iter()
            .flat_map(|&h| self.hemisphere(h).files())
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();

        if missing.is_empty() {
            tracing::info!("All atlas reference files present under {}", self.root.display());
            return Ok(());
        }

        for path in &missing {
            tracing::error!("Atlas file not found: {}", path);
        }

        Err(PipelineError::MissingPrerequisite {
            what: format!("{} atlas reference file(s): {}", missing.len(), missing.join(", ")),
            hint: format!(
                "point --atlas at the standard_mesh_atlases directory (currently {})",
                self.root.display()
            ),
        })
    }
}
