//! Hex aggregation errors.

use geo_common::GeoError;
use thiserror::Error;

pub type HexResult<T> = Result<T, HexError>;

#[derive(Debug, Error)]
pub enum HexError {
    #[error("Invalid H3 resolution: {0}")]
    InvalidResolution(u8),

    #[error("Invalid resolution heuristic: {0}")]
    InvalidHeuristic(String),

    #[error("Unknown aggregation '{0}', expected count, sum, mean, min or max")]
    UnknownAggregation(String),

    #[error("Unknown join kind '{0}', expected inner or left")]
    UnknownJoinKind(String),

    #[error("Cover of {requested} cells exceeds the limit of {limit}")]
    CoverTooLarge { requested: usize, limit: usize },

    #[error("Cannot roll up resolution {from} to finer resolution {to}")]
    InvalidRollup { from: u8, to: u8 },
}

impl From<HexError> for GeoError {
    fn from(err: HexError) -> Self {
        match err {
            HexError::InvalidResolution(_) | HexError::InvalidRollup { .. } => {
                GeoError::invalid("res", err.to_string())
            }
            HexError::UnknownAggregation(_) => GeoError::invalid("agg", err.to_string()),
            HexError::UnknownJoinKind(_) => GeoError::invalid("kind", err.to_string()),
            HexError::CoverTooLarge { .. } => GeoError::invalid("bbox", err.to_string()),
            HexError::InvalidHeuristic(_) => GeoError::InternalError(err.to_string()),
        }
    }
}
