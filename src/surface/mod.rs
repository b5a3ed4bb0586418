//! Surface file codec
//!
//! Time series are held as `(timepoints × vertices)` `f32` arrays. The
//! on-disk container is behind [`SurfaceCodec`]; GIFTI is the only
//! implementation.

mod gifti;

pub use gifti::{parse_gifti, render_gifti, GiftiCodec, GiftiEncoding};

use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// `(timepoints × vertices)` surface time series
pub type TimeSeries = Array2<f32>;

/// Codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed surface file: {0}")]
    Malformed(String),

    #[error("unsupported surface file feature: {0}")]
    Unsupported(String),

    #[error("surface file contains no data arrays")]
    Empty,

    #[error("failed to encode data array: {0}")]
    Encode(String),
}

/// Reads and writes per-vertex time series
pub trait SurfaceCodec: Send + Sync {
    /// File extension without a leading dot, e.g. `func.gii`
    fn extension(&self) -> &'static str;

    fn read_timeseries(&self, path: &Path) -> Result<TimeSeries, CodecError>;

    /// Write `data` with free-form string metadata
    fn write_timeseries(
        &self,
        path: &Path,
        data: ArrayView2<'_, f32>,
        metadata: &[(String, String)],
    ) -> Result<(), CodecError>;
}
