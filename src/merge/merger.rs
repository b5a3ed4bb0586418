//! Hemisphere merger - left + right → bilateral time series

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use ndarray::{concatenate, s, Axis};

use super::loader::{LoadedSeries, SubjectData};
use crate::core::{Acquisition, Hemisphere, KeyScheme};
use crate::surface::TimeSeries;

/// Merged left/right series for one acquisition
#[derive(Debug, Clone)]
pub struct BilateralRecord {
    pub acquisition: Acquisition,
    /// `(timepoints × (left + right vertices))`, left columns first
    pub timeseries: TimeSeries,
    pub n_vertices_left: usize,
    pub n_vertices_right: usize,
    pub left_source: String,
    pub right_source: String,
    pub merged_at: DateTime<Local>,
    /// `(left, right)` timepoints before truncation, when they differed
    pub truncated_from: Option<(usize, usize)>,
}

impl BilateralRecord {
    /// e.g. `REST1_LR_bilateral`
    pub fn name(&self) -> String {
        self.acquisition.bilateral_name()
    }

    pub fn n_timepoints(&self) -> usize {
        self.timeseries.nrows()
    }

    pub fn n_vertices(&self) -> usize {
        self.timeseries.ncols()
    }
}

/// Concatenate one pair along the vertex axis, truncating to the shorter run
pub fn merge_pair(
    acquisition: &Acquisition,
    left: &LoadedSeries,
    right: &LoadedSeries,
) -> Result<BilateralRecord> {
    let (left_t, right_t) = (left.timeseries.nrows(), right.timeseries.nrows());
    let timepoints = left_t.min(right_t);

    let truncated_from = if left_t != right_t {
        tracing::warn!(
            "{}: timepoint mismatch (L={}, R={}), truncating to {}",
            acquisition.name(),
            left_t,
            right_t,
            timepoints
        );
        Some((left_t, right_t))
    } else {
        None
    };

    let timeseries = concatenate(
        Axis(1),
        &[
            left.timeseries.slice(s![..timepoints, ..]),
            right.timeseries.slice(s![..timepoints, ..]),
        ],
    )
    .with_context(|| format!("Failed to concatenate hemispheres of {}", acquisition.name()))?;

    Ok(BilateralRecord {
        acquisition: acquisition.clone(),
        timeseries,
        n_vertices_left: left.timeseries.ncols(),
        n_vertices_right: right.timeseries.ncols(),
        left_source: left.filename.clone(),
        right_source: right.filename.clone(),
        merged_at: Local::now(),
        truncated_from,
    })
}

/// Merge every acquisition of `scheme` for which both sides were loaded
pub fn merge_hemispheres(scheme: &KeyScheme, data: &SubjectData) -> Vec<BilateralRecord> {
    let mut records = Vec::new();

    for acquisition in scheme.acquisitions() {
        let left = data.get(&acquisition.key(Hemisphere::Left));
        let right = data.get(&acquisition.key(Hemisphere::Right));

        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (l, r),
            (None, None) => {
                tracing::debug!("{}: no data for either hemisphere", acquisition.name());
                continue;
            }
            (l, _) => {
                let missing = if l.is_none() { Hemisphere::Left } else { Hemisphere::Right };
                tracing::warn!(
                    "Skipping {}: missing {} hemisphere",
                    acquisition.name(),
                    missing
                );
                continue;
            }
        };

        match merge_pair(acquisition, left, right) {
            Ok(record) => {
                tracing::debug!("Merged {} → {:?}", record.name(), record.timeseries.dim());
                records.push(record);
            }
            Err(e) => tracing::warn!("Skipping {}: {:#}", acquisition.name(), e),
        }
    }

    records
}
