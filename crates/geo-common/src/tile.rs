//! XYZ (slippy map) tile math.
//!
//! Tiles use the Web Mercator scheme with a top-left origin: at zoom `z` the
//! world is split into `2^z × 2^z` tiles, `x` growing east and `y` growing south.

use crate::bbox::MERCATOR_MAX_LAT;
use crate::{BoundingBox, GeoError, GeoResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Deepest zoom level accepted anywhere in hexmap.
pub const MAX_ZOOM: u32 = 24;

/// Slack used when snapping fractional tile positions to tile edges.
const EDGE_EPSILON: f64 = 1e-9;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Build a tile and reject coordinates outside the zoom's matrix.
    pub fn checked(z: u32, x: u32, y: u32) -> GeoResult<Self> {
        let tile = Self { z, x, y };
        if tile.is_valid() {
            Ok(tile)
        } else {
            Err(GeoError::InvalidTile(format!(
                "{}/{}/{} is outside the tile matrix",
                z, x, y
            )))
        }
    }

    /// Whether `x` and `y` lie inside the `2^z` matrix.
    pub fn is_valid(&self) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let n = 1u32 << self.z;
        self.x < n && self.y < n
    }

    /// Generate a cache key string.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }

    /// Get the parent tile (zoom - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Get the four children tiles (zoom + 1).
    pub fn children(&self) -> [TileCoord; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let z = self.z + 1;
        [
            TileCoord { z, x, y },
            TileCoord { z, x: x + 1, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord {
                z,
                x: x + 1,
                y: y + 1,
            },
        ]
    }

    /// Bing-style quadkey for this tile.
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(self.z as usize);
        for i in (1..=self.z).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }

    /// Lon/lat bounds of this tile.
    pub fn bounds(&self) -> BoundingBox {
        tile_to_latlon_bounds(self)
    }
}

/// Fractional tile column for a longitude at `n` tiles per axis.
fn lon_to_tile_frac(lon: f64, n: f64) -> f64 {
    (lon + 180.0) / 360.0 * n
}

/// Fractional tile row for a latitude at `n` tiles per axis.
fn lat_to_tile_frac(lat: f64, n: f64) -> f64 {
    let lat_rad = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n
}

/// Convert lat/lon to Web Mercator tile coordinates.
///
/// Latitudes beyond the Mercator limit and longitudes beyond ±180 are clamped
/// onto the edge tiles.
pub fn latlon_to_tile(lat: f64, lon: f64, zoom: u32) -> TileCoord {
    let n_tiles = 1u64 << zoom;
    let n = n_tiles as f64;
    let max_index = (n_tiles - 1) as f64;

    let x = lon_to_tile_frac(lon.clamp(-180.0, 180.0), n)
        .floor()
        .clamp(0.0, max_index) as u32;
    let y = lat_to_tile_frac(lat, n).floor().clamp(0.0, max_index) as u32;

    TileCoord { z: zoom, x, y }
}

/// Convert Web Mercator tile coordinates to lat/lon bounds.
pub fn tile_to_latlon_bounds(coord: &TileCoord) -> BoundingBox {
    let n = (1u64 << coord.z) as f64;

    let lon_min = coord.x as f64 / n * 360.0 - 180.0;
    let lon_max = (coord.x + 1) as f64 / n * 360.0 - 180.0;

    let lat_max = (PI * (1.0 - 2.0 * coord.y as f64 / n))
        .sinh()
        .atan()
        .to_degrees();
    let lat_min = (PI * (1.0 - 2.0 * (coord.y + 1) as f64 / n))
        .sinh()
        .atan()
        .to_degrees();

    BoundingBox::new(lon_min, lat_min, lon_max, lat_max)
}

/// Upper bound on the number of tiles a single bbox cover may produce.
pub const MAX_TILES: u64 = 1 << 20;

/// Inclusive column and row ranges of the tiles covering `bbox` at `zoom`.
fn tile_range(bbox: &BoundingBox, zoom: u32) -> GeoResult<((u32, u32), (u32, u32))> {
    if zoom > MAX_ZOOM {
        return Err(GeoError::invalid(
            "zoom",
            format!("{} exceeds maximum zoom {}", zoom, MAX_ZOOM),
        ));
    }
    if bbox.min_x > bbox.max_x || bbox.min_y > bbox.max_y {
        return Err(GeoError::InvalidBbox(format!("{:?} is inverted", bbox)));
    }

    let clamped = bbox.clamp_to_mercator();
    let n_tiles = 1u64 << zoom;
    let n = n_tiles as f64;
    let max_index = (n_tiles - 1) as f64;

    let x_lo = (lon_to_tile_frac(clamped.min_x, n) + EDGE_EPSILON).floor();
    let x_hi = (lon_to_tile_frac(clamped.max_x, n) - EDGE_EPSILON).ceil() - 1.0;
    // Rows grow southwards, so the northern edge gives the first row.
    let y_lo = (lat_to_tile_frac(clamped.max_y, n) + EDGE_EPSILON).floor();
    let y_hi = (lat_to_tile_frac(clamped.min_y, n) - EDGE_EPSILON).ceil() - 1.0;

    let x_lo = x_lo.clamp(0.0, max_index) as u32;
    let y_lo = y_lo.clamp(0.0, max_index) as u32;
    let x_hi = (x_hi.clamp(0.0, max_index) as u32).max(x_lo);
    let y_hi = (y_hi.clamp(0.0, max_index) as u32).max(y_lo);
    Ok(((x_lo, x_hi), (y_lo, y_hi)))
}

/// Number of tiles [`tiles_for_bbox`] would return, without building them.
pub fn count_tiles_for_bbox(bbox: &BoundingBox, zoom: u32) -> GeoResult<u64> {
    let ((x_lo, x_hi), (y_lo, y_hi)) = tile_range(bbox, zoom)?;
    Ok((u64::from(x_hi - x_lo) + 1) * (u64::from(y_hi - y_lo) + 1))
}

/// All tiles at `zoom` that intersect `bbox`.
///
/// The bbox is clamped to the Mercator extent first; the union of the returned
/// tiles covers the clamped box. Tiles are ordered row by row from the north-west.
/// Covers larger than [`MAX_TILES`] are rejected.
pub fn tiles_for_bbox(bbox: &BoundingBox, zoom: u32) -> GeoResult<Vec<TileCoord>> {
    let ((x_lo, x_hi), (y_lo, y_hi)) = tile_range(bbox, zoom)?;
    let count = (u64::from(x_hi - x_lo) + 1) * (u64::from(y_hi - y_lo) + 1);
    if count > MAX_TILES {
        return Err(GeoError::invalid(
            "zoom",
            format!(
                "bbox covers {} tiles at zoom {}, limit is {}",
                count, zoom, MAX_TILES
            ),
        ));
    }

    let mut tiles = Vec::with_capacity(count as usize);
    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            tiles.push(TileCoord { z: zoom, x, y });
        }
    }
    Ok(tiles)
}

/// Estimate the zoom level at which `bbox` fills a viewport of
/// `viewport_px` pixels rendered with `tile_size_px` tiles.
///
/// The larger of the longitude span and the Mercator-corrected latitude span
/// decides. Degenerate boxes map to [`MAX_ZOOM`].
pub fn estimate_zoom(bbox: &BoundingBox, tile_size_px: u32, viewport_px: u32) -> u32 {
    let clamped = bbox.clamp_to_mercator();
    let lon_span = clamped.width().abs();
    // Latitude span expressed in "longitude degrees" of Mercator y.
    let lat_span =
        (lat_to_tile_frac(clamped.min_y, 1.0) - lat_to_tile_frac(clamped.max_y, 1.0)).abs() * 360.0;
    let span = lon_span.max(lat_span);

    if span <= 0.0 || !span.is_finite() || tile_size_px == 0 {
        return MAX_ZOOM;
    }

    let ratio = (360.0 / span) * (viewport_px as f64 / tile_size_px as f64);
    let zoom = (ratio.log2() + EDGE_EPSILON).floor();
    zoom.clamp(0.0, MAX_ZOOM as f64) as u32
}

/// TMS (Tile Map Service) Y-flip conversion.
/// TMS uses bottom-left origin, while XYZ uses top-left.
/// Rows outside the `2^z` matrix are rejected.
pub fn tms_to_xyz(z: u32, x: u32, y: u32) -> GeoResult<TileCoord> {
    let tms = TileCoord::checked(z, x, y)?;
    Ok(TileCoord {
        y: (1u32 << z) - 1 - tms.y,
        ..tms
    })
}

pub fn xyz_to_tms(coord: &TileCoord) -> GeoResult<(u32, u32, u32)> {
    let tile = TileCoord::checked(coord.z, coord.x, coord.y)?;
    Ok((tile.z, tile.x, (1u32 << tile.z) - 1 - tile.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_zero_covers_world() {
        let b = TileCoord::new(0, 0, 0).bounds();
        assert_eq!(b.min_x, -180.0);
        assert_eq!(b.max_x, 180.0);
        assert!((b.max_y - MERCATOR_MAX_LAT).abs() < 1e-9);
        assert!((b.min_y + MERCATOR_MAX_LAT).abs() < 1e-9);
    }

    #[test]
    fn test_latlon_to_tile_known() {
        // Null Island at zoom 1 lands in the south-east quadrant.
        assert_eq!(latlon_to_tile(0.0, 0.0, 1), TileCoord::new(1, 1, 1));
        // Clamped poles and antimeridian stay inside the matrix.
        assert_eq!(latlon_to_tile(90.0, 180.0, 2), TileCoord::new(2, 3, 0));
        assert_eq!(latlon_to_tile(-90.0, -180.0, 2), TileCoord::new(2, 0, 3));
    }

    #[test]
    fn test_quadkey() {
        assert_eq!(TileCoord::new(3, 3, 5).quadkey(), "213");
        assert_eq!(TileCoord::new(0, 0, 0).quadkey(), "");
    }

    #[test]
    fn test_tms_roundtrip() {
        let xyz = tms_to_xyz(3, 2, 1).unwrap();
        assert_eq!(xyz, TileCoord::new(3, 2, 6));
        assert_eq!(xyz_to_tms(&xyz).unwrap(), (3, 2, 1));
    }

    #[test]
    fn test_tms_rejects_rows_outside_matrix() {
        assert!(matches!(tms_to_xyz(3, 2, 8), Err(GeoError::InvalidTile(_))));
        assert!(matches!(tms_to_xyz(40, 0, 0), Err(GeoError::InvalidTile(_))));
        assert!(xyz_to_tms(&TileCoord::new(0, 0, 1)).is_err());
    }

    #[test]
    fn test_estimate_zoom_world() {
        assert_eq!(estimate_zoom(&BoundingBox::world(), 256, 256), 0);
        assert_eq!(estimate_zoom(&BoundingBox::world(), 256, 1024), 2);
    }

    #[test]
    fn test_estimate_zoom_degenerate() {
        let point = BoundingBox::new(10.0, 10.0, 10.0, 10.0);
        assert_eq!(estimate_zoom(&point, 256, 256), MAX_ZOOM);
    }
}
