//! Error types for hexmap crates and services.

use thiserror::Error;

/// Result type alias using GeoError.
pub type GeoResult<T> = Result<T, GeoError>;

/// Primary error type for tile, hex and raster requests.
#[derive(Debug, Error)]
pub enum GeoError {
    // === Request Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid tile: {0}")]
    InvalidTile(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Colormap not found: {0}")]
    ColormapNotFound(String),

    // === Data Errors ===
    #[error("Failed to read data: {0}")]
    DataReadError(String),

    #[error("Upstream fetch failed: {0}")]
    FetchError(String),

    #[error("Aggregation failed: {0}")]
    AggregationError(String),

    #[error("Rendering failed: {0}")]
    RenderError(String),

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Request timeout")]
    Timeout,
}

impl GeoError {
    /// Short machine-readable code for JSON error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            GeoError::MissingParameter(_) => "MissingParameter",
            GeoError::InvalidParameter { .. } => "InvalidParameter",
            GeoError::InvalidBbox(_) => "InvalidBbox",
            GeoError::InvalidTile(_) => "InvalidTile",
            GeoError::SourceNotFound(_) => "SourceNotFound",
            GeoError::ColormapNotFound(_) => "ColormapNotFound",
            GeoError::FetchError(_) => "FetchFailed",
            GeoError::Timeout => "Timeout",
            _ => "NoApplicableCode",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            GeoError::MissingParameter(_)
            | GeoError::InvalidParameter { .. }
            | GeoError::InvalidBbox(_)
            | GeoError::InvalidTile(_) => 400,

            GeoError::SourceNotFound(_) | GeoError::ColormapNotFound(_) => 404,

            GeoError::FetchError(_) => 502,
            GeoError::Timeout => 504,

            _ => 500,
        }
    }

    /// Shorthand for an invalid parameter error.
    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        GeoError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        GeoError::DataReadError(err.to_string())
    }
}

impl From<serde_json::Error> for GeoError {
    fn from(err: serde_json::Error) -> Self {
        GeoError::InternalError(format!("JSON error: {}", err))
    }
}

impl From<crate::bbox::BboxParseError> for GeoError {
    fn from(err: crate::bbox::BboxParseError) -> Self {
        GeoError::InvalidBbox(err.to_string())
    }
}
