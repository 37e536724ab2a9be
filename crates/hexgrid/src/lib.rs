//! H3 hexagon helpers for map tiles.
//!
//! The typical flow for a tile request is:
//! 1. pick a resolution from the zoom level ([`ResolutionHeuristic`]),
//! 2. flatten a raster window or point list into hex bins ([`aggregate_raster`],
//!    [`aggregate_points`]),
//! 3. optionally join with another dataset's bins ([`join`]) and emit rows.

pub mod aggregate;
pub mod cover;
pub mod error;
pub mod join;
pub mod resolution;

pub use aggregate::{
    aggregate_points, aggregate_raster, AggregateStats, Aggregation, HexCell, HexRow, HexTable,
    PointValue,
};
pub use cover::{cells_for_bbox, MAX_COVER_CELLS};
pub use error::{HexError, HexResult};
pub use join::{join, JoinKind, JoinedRow};
pub use resolution::{to_resolution, DecimationHeuristic, ResolutionHeuristic};

pub use h3o::{CellIndex, Resolution};
