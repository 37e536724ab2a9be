//! Common types and utilities shared across all hexmap crates.

pub mod bbox;
pub mod error;
pub mod tile;

pub use bbox::BoundingBox;
pub use error::{GeoError, GeoResult};
pub use tile::{
    count_tiles_for_bbox, estimate_zoom, latlon_to_tile, tiles_for_bbox, TileCoord, MAX_TILES,
    MAX_ZOOM,
};
