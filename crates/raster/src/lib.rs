//! Raster handling for map tiles.
//!
//! - [`grid`]: north-up grids with an affine geotransform, windowing and resampling
//! - [`geotiff`]: GeoTIFF decoding/encoding of single-band rasters
//! - [`colormap`]: named and JSON-defined color ramps
//! - [`colorize`]: value → RGBA mapping, tile rendering, channel-first arrays
//! - [`png`]: PNG encoding (indexed or RGBA)

pub mod colorize;
pub mod colormap;
pub mod error;
pub mod geotiff;
pub mod grid;
pub mod png;

pub use colorize::{colorize, render_tile, ChannelFirstArray, RgbaImage};
pub use colormap::{Color, ColorStop, Colormap};
pub use error::{RasterError, RasterResult};
pub use geotiff::{read_geotiff, read_geotiff_path, write_geotiff};
pub use grid::{GeoTransform, RasterGrid};
