//! Scanner - Subject discovery over an input tree
//!
//! A subject is any direct subdirectory of the root that holds at least one
//! file whose name matches the discovery glob somewhere below it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use walkdir::{DirEntry, WalkDir};

use super::SubjectId;

/// Default search depth below a subject directory
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Glob-driven subject and file discovery
#[derive(Debug, Clone)]
pub struct Discovery {
    root: PathBuf,
    pattern: String,
    matcher: GlobMatcher,
    max_depth: usize,
}

impl Discovery {
    /// Create a discovery for `root`, matching file names against `pattern`
    pub fn new(root: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let matcher = Glob::new(pattern)
            .with_context(|| format!("Invalid discovery pattern: {}", pattern))?
            .compile_matcher();

        Ok(Self {
            root: root.into(),
            pattern: pattern.to_string(),
            matcher,
            max_depth: DEFAULT_MAX_DEPTH,
        })
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.root.join(subject)
    }

    /// Sorted ids of subject directories holding at least one match.
    /// An empty result is returned as-is; the caller decides what to do.
    pub fn find_subjects(&self) -> Result<Vec<SubjectId>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read input directory: {}", self.root.display()))?;

        let mut subjects = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", self.root.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            if self.walk(&path).next().is_some() {
                subjects.push(name);
            }
        }

        subjects.sort();
        tracing::info!(
            "Found {} subject(s) with '{}' under {}",
            subjects.len(),
            self.pattern,
            self.root.display()
        );
        Ok(subjects)
    }

    /// Sorted matching files for one subject; empty when the directory
    /// is missing or holds nothing relevant
    pub fn subject_files(&self, subject: &str) -> Vec<PathBuf> {
        let dir = self.subject_dir(subject);
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = self.walk(&dir).map(|e| e.into_path()).collect();
        files.sort();
        files
    }

    fn walk<'a>(&'a self, dir: &Path) -> impl Iterator<Item = DirEntry> + 'a {
        WalkDir::new(dir)
            .follow_links(true)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(move |e| {
                let name = e.file_name().to_string_lossy();
                !is_in_flight_artifact(&name) && self.matcher.is_match(name.as_ref())
            })
    }
}

/// Hidden files, native-mesh intermediates and staged writes are never inputs
pub fn is_in_flight_artifact(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name.starts_with("temp_")
}
