//! Value → RGBA rendering of raster grids.

use std::f64::consts::PI;

use geo_common::TileCoord;
use rayon::prelude::*;
use serde::Serialize;

use crate::{png, Color, Colormap, RasterGrid, RasterResult};

/// Row-major interleaved RGBA image.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

/// A `bands × height × width` u8 array, the layout map clients expect for
/// raster tiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelFirstArray {
    pub shape: [usize; 3],
    pub data: Vec<u8>,
}

impl RgbaImage {
    pub fn transparent(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some(Color::new(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ))
    }

    /// Split the interleaved pixels into four planes.
    pub fn to_channel_first(&self) -> ChannelFirstArray {
        let plane = self.width * self.height;
        let mut data = vec![0u8; plane * 4];
        for (i, px) in self.pixels.chunks_exact(4).enumerate() {
            for (band, value) in px.iter().enumerate() {
                data[band * plane + i] = *value;
            }
        }
        ChannelFirstArray {
            shape: [4, self.height, self.width],
            data,
        }
    }

    pub fn to_png(&self) -> RasterResult<Vec<u8>> {
        png::encode_png(self)
    }
}

/// Normalize into `[0, 1]` against `(min, max)`; a flat range maps to 0.
#[inline]
fn normalize(value: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    if range.abs() < f32::EPSILON {
        0.0
    } else {
        ((value - min) / range).clamp(0.0, 1.0)
    }
}

/// Map every pixel through `colormap`.
///
/// `range` defaults to the grid's valid min/max. No-data pixels are transparent.
pub fn colorize(grid: &RasterGrid, colormap: &Colormap, range: Option<(f32, f32)>) -> RgbaImage {
    let Some((min, max)) = range.or_else(|| grid.value_range()) else {
        return RgbaImage::transparent(grid.width, grid.height);
    };

    let mut pixels = vec![0u8; grid.width * grid.height * 4];
    pixels
        .par_chunks_mut(4)
        .zip(grid.data.par_iter())
        .for_each(|(px, value)| {
            if grid.is_nodata(*value) {
                return;
            }
            let c = colormap.color_at(normalize(*value, min, max));
            px.copy_from_slice(&[c.r, c.g, c.b, c.a]);
        });

    RgbaImage {
        width: grid.width,
        height: grid.height,
        pixels,
    }
}

/// Render one XYZ tile of `size × size` pixels from a lon/lat grid.
///
/// Each output pixel samples the grid at its Web Mercator pixel center, so
/// rows follow Mercator latitude spacing. Pixels outside the grid stay
/// transparent; a tile that misses the grid entirely is fully transparent.
pub fn render_tile(
    grid: &RasterGrid,
    tile: &TileCoord,
    size: usize,
    colormap: &Colormap,
    range: Option<(f32, f32)>,
) -> RgbaImage {
    let bounds = tile.bounds();
    if !grid.bounds().intersects(&bounds) {
        return RgbaImage::transparent(size, size);
    }
    let Some((min, max)) = range.or_else(|| grid.value_range()) else {
        return RgbaImage::transparent(size, size);
    };

    let n = (1u64 << tile.z) as f64;
    let mut pixels = vec![0u8; size * size * 4];

    pixels
        .par_chunks_mut(size * 4)
        .enumerate()
        .for_each(|(py, row)| {
            let y_frac = (tile.y as f64 + (py as f64 + 0.5) / size as f64) / n;
            let lat = (PI * (1.0 - 2.0 * y_frac)).sinh().atan().to_degrees();
            for px in 0..size {
                let lon = bounds.min_x + (px as f64 + 0.5) / size as f64 * bounds.width();
                if let Some(v) = grid.sample(lon, lat) {
                    let c = colormap.color_at(normalize(v, min, max));
                    row[px * 4..px * 4 + 4].copy_from_slice(&[c.r, c.g, c.b, c.a]);
                }
            }
        });

    RgbaImage {
        width: size,
        height: size,
        pixels,
    }
}
