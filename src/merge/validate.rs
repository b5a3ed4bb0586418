//! Validation of merged records
//!
//! Checks are recorded, never enforced: a failing record is still written.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::merger::BilateralRecord;

/// Default magnitude bound for `reasonable_range`
pub const DEFAULT_VALUE_BOUND: f32 = 1000.0;

/// Individual boolean checks for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationChecks {
    pub shape_valid: bool,
    pub no_nan: bool,
    pub no_inf: bool,
    pub vertices_match: bool,
    pub timepoints_positive: bool,
    pub vertices_positive: bool,
    pub reasonable_range: bool,
}

impl ValidationChecks {
    pub fn all_passed(&self) -> bool {
        self.failed().is_empty()
    }

    /// Names of the checks that did not pass
    pub fn failed(&self) -> Vec<&'static str> {
        [
            ("shape_valid", self.shape_valid),
            ("no_nan", self.no_nan),
            ("no_inf", self.no_inf),
            ("vertices_match", self.vertices_match),
            ("timepoints_positive", self.timepoints_positive),
            ("vertices_positive", self.vertices_positive),
            ("reasonable_range", self.reasonable_range),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub checks: ValidationChecks,
    pub shape: [usize; 2],
    /// `[min, max]` over finite values; `None` when there are none
    pub data_range: Option<[f32; 2]>,
    pub dtype: String,
    pub memory_usage_mb: f64,
}

/// Run all checks on one record
pub fn validate_record(record: &BilateralRecord, value_bound: f32) -> ValidationResult {
    let ts = &record.timeseries;
    let (timepoints, vertices) = ts.dim();

    let mut has_nan = false;
    let mut has_inf = false;
    let mut range: Option<(f32, f32)> = None;
    for &v in ts.iter() {
        if v.is_nan() {
            has_nan = true;
        } else if v.is_infinite() {
            has_inf = true;
        } else {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
    }

    let reasonable_range = match range {
        Some((lo, hi)) => lo.abs() < value_bound && hi.abs() < value_bound,
        None => true,
    };

    let checks = ValidationChecks {
        shape_valid: ts.ndim() == 2,
        no_nan: !has_nan,
        no_inf: !has_inf,
        vertices_match: vertices == record.n_vertices_left + record.n_vertices_right,
        timepoints_positive: timepoints > 0,
        vertices_positive: vertices > 0,
        reasonable_range,
    };

    ValidationResult {
        valid: checks.all_passed(),
        checks,
        shape: [timepoints, vertices],
        data_range: range.map(|(lo, hi)| [lo, hi]),
        dtype: "float32".to_string(),
        memory_usage_mb: (ts.len() * std::mem::size_of::<f32>()) as f64 / (1024.0 * 1024.0),
    }
}

/// Everything written to `validation_results.json` for one subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub subject: String,
    pub validated_at: DateTime<Local>,
    pub all_valid: bool,
    pub records: BTreeMap<String, ValidationResult>,
}

impl ValidationReport {
    /// Validate every record, logging failures at warn
    pub fn build(subject: &str, records: &[BilateralRecord], value_bound: f32) -> Self {
        let mut results = BTreeMap::new();
        for record in records {
            let result = validate_record(record, value_bound);
            if !result.valid {
                tracing::warn!(
                    "[{}] {} failed validation: {}",
                    subject,
                    record.name(),
                    result.checks.failed().join(", ")
                );
            }
            results.insert(record.name(), result);
        }

        Self {
            subject: subject.to_string(),
            validated_at: Local::now(),
            all_valid: results.values().all(|r| r.valid),
            records: results,
        }
    }
}
