//! Raster error types.

use geo_common::GeoError;
use thiserror::Error;

pub type RasterResult<T> = Result<T, RasterError>;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoTIFF is missing georeferencing tag {0}")]
    MissingGeoreference(&'static str),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Data length {actual} does not match {width}x{height} grid")]
    DimensionMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("Invalid colormap: {0}")]
    InvalidColormap(String),

    #[error("Unknown colormap: {0}")]
    UnknownColormap(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

impl From<RasterError> for GeoError {
    fn from(err: RasterError) -> Self {
        match err {
            RasterError::UnknownColormap(name) => GeoError::ColormapNotFound(name),
            RasterError::InvalidColormap(msg) => GeoError::invalid("colormap", msg),
            RasterError::Encode(msg) => GeoError::RenderError(msg),
            other => GeoError::DataReadError(other.to_string()),
        }
    }
}
