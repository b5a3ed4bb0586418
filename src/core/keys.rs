//! Acquisition key classification
//!
//! A scheme is an ordered list of tagged predicates. A file name is assigned
//! the key of the first predicate whose required substrings are all present.
//! Patterns are built so that no canonical file name satisfies two of them.

use super::{Acquisition, AcquisitionKey, DataKind, Hemisphere};

/// HCP task-fMRI paradigms, in acquisition order
pub const HCP_TASKS: [&str; 7] = [
    "EMOTION",
    "SOCIAL",
    "WM",
    "GAMBLING",
    "LANGUAGE",
    "MOTOR",
    "RELATIONAL",
];

const REST_SESSIONS: [&str; 2] = ["REST1", "REST2"];
const PHASES: [&str; 2] = ["LR", "RL"];

/// A single tagged predicate: all `required` substrings must be present
#[derive(Debug, Clone)]
pub struct KeyPattern {
    pub key: AcquisitionKey,
    pub required: Vec<String>,
}

impl KeyPattern {
    pub fn matches(&self, file_name: &str) -> bool {
        self.required.iter().all(|part| file_name.contains(part.as_str()))
    }
}

/// Ordered predicates plus the acquisitions that are merged pairwise
#[derive(Debug, Clone)]
pub struct KeyScheme {
    patterns: Vec<KeyPattern>,
    acquisitions: Vec<Acquisition>,
}

impl KeyScheme {
    pub fn for_kind(kind: DataKind) -> Self {
        match kind {
            DataKind::Rest => Self::resting_state(),
            DataKind::Task => Self::task_runs(),
        }
    }

    /// REST1/REST2 × LR/RL
    pub fn resting_state() -> Self {
        let acquisitions: Vec<Acquisition> = REST_SESSIONS
            .iter()
            .flat_map(|session| PHASES.iter().map(move |phase| Acquisition::new(*session, *phase)))
            .collect();

        Self::build(acquisitions, |acq, hemi| {
            vec![
                format!("_{}_", acq.session),
                format!("_{}_", acq.phase),
                format!(".{}.", hemi.letter()),
            ]
        })
    }

    /// Seven HCP tasks × LR/RL on the plain `_Atlas.` variant
    pub fn task_runs() -> Self {
        let acquisitions: Vec<Acquisition> = HCP_TASKS
            .iter()
            .flat_map(|task| PHASES.iter().map(move |phase| Acquisition::new(*task, *phase)))
            .collect();

        Self::build(acquisitions, |acq, hemi| {
            vec![
                format!("tfMRI_{}_{}_Atlas.", acq.session, acq.phase),
                format!(".{}.", hemi.letter()),
            ]
        })
    }

    fn build<F>(acquisitions: Vec<Acquisition>, required: F) -> Self
    where
        F: Fn(&Acquisition, Hemisphere) -> Vec<String>,
    {
        let patterns = acquisitions
            .iter()
            .flat_map(|acq| {
                Hemisphere::BOTH.iter().map(|&hemi| KeyPattern {
                    key: acq.key(hemi),
                    required: required(acq, hemi),
                })
            })
            .collect();

        Self {
            patterns,
            acquisitions,
        }
    }

    /// First matching key wins
    pub fn classify(&self, file_name: &str) -> Option<&AcquisitionKey> {
        self.patterns
            .iter()
            .find(|p| p.matches(file_name))
            .map(|p| &p.key)
    }

    /// Every key whose predicate matches; more than one means the scheme
    /// is not exclusive for this name
    pub fn matching_keys(&self, file_name: &str) -> Vec<&AcquisitionKey> {
        self.patterns
            .iter()
            .filter(|p| p.matches(file_name))
            .map(|p| &p.key)
            .collect()
    }

    /// Acquisitions merged pairwise, in report order
    pub fn acquisitions(&self) -> &[Acquisition] {
        &self.acquisitions
    }

    pub fn patterns(&self) -> &[KeyPattern] {
        &self.patterns
    }
}
