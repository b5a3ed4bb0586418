//! Verify module - Post-hoc check of resampled output trees
//!
//! For each subject: every resampled hemisphere file has its partner, holds
//! exactly the target mesh vertex count, and the subject has a processing
//! summary.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::{Hemisphere, SubjectId};
use crate::resample::SUBJECT_SUMMARY_FILE;
use crate::surface::SurfaceCodec;
use crate::tool::AtlasMeshes;

/// One resampled file as read back from disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCheck {
    pub filename: String,
    pub hemisphere: Hemisphere,
    pub timepoints: Option<usize>,
    pub vertices: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectVerification {
    pub subject: SubjectId,
    pub complete_pairs: usize,
    pub files: Vec<FileCheck>,
    pub has_summary: bool,
    pub issues: Vec<String>,
}

impl SubjectVerification {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub output_root: PathBuf,
    pub target_vertices: usize,
    pub subjects: Vec<SubjectVerification>,
}

impl VerifyReport {
    pub fn ok_count(&self) -> usize {
        self.subjects.iter().filter(|s| s.is_ok()).count()
    }

    pub fn all_ok(&self) -> bool {
        self.ok_count() == self.subjects.len()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Verification of {}", self.output_root.display());
        let _ = writeln!(out, "Target vertices per hemisphere: {}", self.target_vertices);
        let _ = writeln!(out);

        for subject in &self.subjects {
            let mark = if subject.is_ok() { "✓" } else { "✗" };
            let _ = writeln!(
                out,
                "{} {}: {} complete pair(s), summary {}",
                mark,
                subject.subject,
                subject.complete_pairs,
                if subject.has_summary { "present" } else { "missing" }
            );
            for issue in &subject.issues {
                let _ = writeln!(out, "    - {}", issue);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}/{} subjects verified",
            self.ok_count(),
            self.subjects.len()
        );
        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize verification report")
    }
}

/// Reads resampled outputs back and checks them against the target mesh
pub struct OutputVerifier {
    output_root: PathBuf,
    target_tag: String,
    target_vertices: usize,
    codec: Arc<dyn SurfaceCodec>,
}

impl OutputVerifier {
    pub fn new(output_root: impl Into<PathBuf>, atlas: &AtlasMeshes, codec: Arc<dyn SurfaceCodec>) -> Self {
        Self {
            output_root: output_root.into(),
            target_tag: atlas.target_tag().to_string(),
            target_vertices: atlas.target_vertices(),
            codec,
        }
    }

    /// Sorted subject directories under the output root
    pub fn subjects(&self) -> Result<Vec<SubjectId>> {
        let mut subjects: Vec<SubjectId> = std::fs::read_dir(&self.output_root)
            .with_context(|| format!("Failed to read {}", self.output_root.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        subjects.sort();
        Ok(subjects)
    }

    /// `(base, hemisphere)` for a resampled output name
    fn parse_output_name(&self, name: &str) -> Option<(String, Hemisphere)> {
        Hemisphere::BOTH.iter().find_map(|&h| {
            let suffix = format!(".{}.{}_{}.{}", h, self.target_tag, h, self.codec.extension());
            name.strip_suffix(&suffix).map(|base| (base.to_string(), h))
        })
    }

    pub fn verify_subject(&self, subject: &str) -> SubjectVerification {
        let dir = self.output_root.join(subject);
        let mut issues = Vec::new();
        let has_summary = dir.join(SUBJECT_SUMMARY_FILE).is_file();
        if !has_summary {
            issues.push(format!("{} missing", SUBJECT_SUMMARY_FILE));
        }

        let mut names: Vec<String> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|n| !n.starts_with('.'))
                .collect(),
            Err(e) => {
                issues.push(format!("cannot read directory: {}", e));
                Vec::new()
            }
        };
        names.sort();

        let mut by_base: BTreeMap<String, Vec<Hemisphere>> = BTreeMap::new();
        let mut files = Vec::new();
        for name in names {
            let Some((base, hemisphere)) = self.parse_output_name(&name) else {
                continue;
            };
            by_base.entry(base).or_default().push(hemisphere);
            files.push(self.check_file(&dir.join(&name), name, hemisphere));
        }

        if files.is_empty() {
            issues.push("no resampled files".to_string());
        }

        let mut complete_pairs = 0;
        for (base, sides) in &by_base {
            if sides.len() == 2 {
                complete_pairs += 1;
            } else {
                let missing = if sides.contains(&Hemisphere::Left) { Hemisphere::Right } else { Hemisphere::Left };
                issues.push(format!("{}: missing {} hemisphere", base, missing));
            }
        }

        for file in &files {
            match (&file.error, file.vertices) {
                (Some(e), _) => issues.push(format!("{}: unreadable ({})", file.filename, e)),
                (None, Some(v)) if v != self.target_vertices => issues.push(format!(
                    "{}: {} vertices, expected {}",
                    file.filename, v, self.target_vertices
                )),
                _ => {}
            }
        }

        SubjectVerification {
            subject: subject.to_string(),
            complete_pairs,
            files,
            has_summary,
            issues,
        }
    }

    fn check_file(&self, path: &Path, filename: String, hemisphere: Hemisphere) -> FileCheck {
        match self.codec.read_timeseries(path) {
            Ok(ts) => FileCheck {
                filename,
                hemisphere,
                timepoints: Some(ts.nrows()),
                vertices: Some(ts.ncols()),
                error: None,
            },
            Err(e) => FileCheck {
                filename,
                hemisphere,
                timepoints: None,
                vertices: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Verify the given subjects in parallel
    pub fn verify_all(&self, subjects: &[SubjectId]) -> VerifyReport {
        let results: Vec<SubjectVerification> =
            subjects.par_iter().map(|s| self.verify_subject(s)).collect();

        for result in results.iter().filter(|r| !r.is_ok()) {
            tracing::warn!("{}: {}", result.subject, result.issues.join("; "));
        }

        VerifyReport {
            output_root: self.output_root.clone(),
            target_vertices: self.target_vertices,
            subjects: results,
        }
    }
}
