//! Georeferenced raster grids.
//!
//! A [`RasterGrid`] holds a single band of `f32` values in row-major order with
//! a north-up [`GeoTransform`] mapping pixel corners to lon/lat. No-data is
//! either `NaN` or the grid's configured `nodata` value.

use geo_common::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::{RasterError, RasterResult};

/// Affine transform for north-up rasters (no rotation terms).
///
/// `origin_x`/`origin_y` is the outer corner of pixel (0, 0). `pixel_height`
/// is negative when rows run north to south, as in most GeoTIFFs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Transform for a `width × height` grid stretched over `bbox`, top-left origin.
    pub fn from_bounds(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self {
            origin_x: bbox.min_x,
            origin_y: bbox.max_y,
            pixel_width: bbox.width() / width.max(1) as f64,
            pixel_height: -bbox.height() / height.max(1) as f64,
        }
    }

    /// Fractional pixel position → geographic coordinate.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Geographic coordinate → fractional pixel position.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }
}

/// A single-band raster with georeferencing.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub transform: GeoTransform,
    pub nodata: Option<f32>,
}

impl RasterGrid {
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        transform: GeoTransform,
    ) -> RasterResult<Self> {
        if data.len() != width * height {
            return Err(RasterError::DimensionMismatch {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            transform,
            nodata: None,
        })
    }

    /// Build a grid spanning `bbox` with a top-left origin.
    pub fn from_bounds(
        bbox: &BoundingBox,
        width: usize,
        height: usize,
        data: Vec<f32>,
    ) -> RasterResult<Self> {
        Self::new(width, height, data, GeoTransform::from_bounds(bbox, width, height))
    }

    pub fn with_nodata(mut self, nodata: Option<f32>) -> Self {
        self.nodata = nodata;
        self
    }

    /// Whether a raw value counts as missing.
    #[inline]
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| value == nd)
    }

    /// Raw value at (col, row), including no-data values.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Value at (col, row), `None` when out of range or no-data.
    pub fn value_at(&self, col: usize, row: usize) -> Option<f32> {
        self.get(col, row).filter(|v| !self.is_nodata(*v))
    }

    /// Lon/lat of a pixel center.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform
            .pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Geographic extent of the grid.
    pub fn bounds(&self) -> BoundingBox {
        let (x0, y0) = self.transform.pixel_to_geo(0.0, 0.0);
        let (x1, y1) = self
            .transform
            .pixel_to_geo(self.width as f64, self.height as f64);
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Number of pixels that are not no-data.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Min/max over valid pixels.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !self.is_nodata(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Extract the pixels intersecting `bbox`.
    ///
    /// Indices are snapped outwards (floor for the start, ceil for the end) so
    /// that windows for adjacent boxes share their boundary pixels. Returns
    /// `None` if the box misses the grid.
    pub fn window(&self, bbox: &BoundingBox) -> Option<RasterGrid> {
        let overlap = self.bounds().intersection(bbox)?;

        let (c0, r0) = self.transform.geo_to_pixel(overlap.min_x, overlap.max_y);
        let (c1, r1) = self.transform.geo_to_pixel(overlap.max_x, overlap.min_y);

        let col_min = c0.min(c1).floor().max(0.0) as usize;
        let col_max = (c0.max(c1).ceil() as usize).min(self.width);
        let row_min = r0.min(r1).floor().max(0.0) as usize;
        let row_max = (r0.max(r1).ceil() as usize).min(self.height);

        let col_min = col_min.min(self.width - 1);
        let row_min = row_min.min(self.height - 1);
        let col_max = col_max.max(col_min + 1);
        let row_max = row_max.max(row_min + 1);

        let sub_w = col_max - col_min;
        let sub_h = row_max - row_min;
        let mut data = Vec::with_capacity(sub_w * sub_h);
        for row in row_min..row_max {
            let start = row * self.width + col_min;
            data.extend_from_slice(&self.data[start..start + sub_w]);
        }

        let (origin_x, origin_y) = self
            .transform
            .pixel_to_geo(col_min as f64, row_min as f64);

        Some(RasterGrid {
            width: sub_w,
            height: sub_h,
            data,
            transform: GeoTransform::new(
                origin_x,
                origin_y,
                self.transform.pixel_width,
                self.transform.pixel_height,
            ),
            nodata: self.nodata,
        })
    }

    /// Bilinear sample at a fractional pixel-center position.
    ///
    /// Falls back to the nearest pixel when any neighbour is no-data so that
    /// missing values never bleed into valid ones.
    fn sample_pixel(&self, px: f64, py: f64) -> Option<f32> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let px = px.clamp(0.0, max_x);
        let py = py.clamp(0.0, max_y);

        let x1 = px.floor() as usize;
        let y1 = py.floor() as usize;
        let x2 = (x1 + 1).min(self.width - 1);
        let y2 = (y1 + 1).min(self.height - 1);
        let dx = (px - x1 as f64) as f32;
        let dy = (py - y1 as f64) as f32;

        let v11 = self.value_at(x1, y1);
        let v21 = self.value_at(x2, y1);
        let v12 = self.value_at(x1, y2);
        let v22 = self.value_at(x2, y2);

        match (v11, v21, v12, v22) {
            (Some(v11), Some(v21), Some(v12), Some(v22)) => {
                let v1 = v11 * (1.0 - dx) + v21 * dx;
                let v2 = v12 * (1.0 - dx) + v22 * dx;
                Some(v1 * (1.0 - dy) + v2 * dy)
            }
            _ => self.value_at(px.round() as usize, py.round() as usize),
        }
    }

    /// Bilinear sample at a geographic coordinate; `None` outside the grid.
    pub fn sample(&self, x: f64, y: f64) -> Option<f32> {
        if !self.bounds().contains_point(x, y) {
            return None;
        }
        let (col, row) = self.transform.geo_to_pixel(x, y);
        self.sample_pixel(col - 0.5, row - 0.5)
    }

    /// Resample to `dst_width × dst_height` over the same extent (bilinear).
    pub fn resample(&self, dst_width: usize, dst_height: usize) -> RasterGrid {
        if dst_width == self.width && dst_height == self.height {
            return self.clone();
        }

        let x_ratio = self.width as f64 / dst_width.max(1) as f64;
        let y_ratio = self.height as f64 / dst_height.max(1) as f64;
        let fill = self.nodata.unwrap_or(f32::NAN);

        let mut data = vec![fill; dst_width * dst_height];
        for y in 0..dst_height {
            let src_y = (y as f64 + 0.5) * y_ratio - 0.5;
            for x in 0..dst_width {
                let src_x = (x as f64 + 0.5) * x_ratio - 0.5;
                if let Some(v) = self.sample_pixel(src_x, src_y) {
                    data[y * dst_width + x] = v;
                }
            }
        }

        RasterGrid {
            width: dst_width,
            height: dst_height,
            data,
            transform: GeoTransform::new(
                self.transform.origin_x,
                self.transform.origin_y,
                self.transform.pixel_width * x_ratio,
                self.transform.pixel_height * y_ratio,
            ),
            nodata: self.nodata,
        }
    }

    /// Block-average by roughly `factor` in both directions, ignoring no-data.
    ///
    /// The output has `ceil(width / factor) × ceil(height / factor)` pixels
    /// spread over the same extent as `self`; source columns and rows are
    /// split evenly between them, so blocks differ in size by at most one
    /// pixel. A block with no valid pixel becomes no-data.
    pub fn decimate(&self, factor: usize) -> RasterGrid {
        if factor <= 1 {
            return self.clone();
        }
        let dst_w = self.width.div_ceil(factor);
        let dst_h = self.height.div_ceil(factor);
        let fill = self.nodata.unwrap_or(f32::NAN);
        let col_span = |bx: usize| (bx * self.width / dst_w)..((bx + 1) * self.width / dst_w);
        let row_span = |by: usize| (by * self.height / dst_h)..((by + 1) * self.height / dst_h);

        let mut data = Vec::with_capacity(dst_w * dst_h);
        for by in 0..dst_h {
            for bx in 0..dst_w {
                let mut sum = 0.0f64;
                let mut n = 0usize;
                for row in row_span(by) {
                    for col in col_span(bx) {
                        if let Some(v) = self.value_at(col, row) {
                            sum += v as f64;
                            n += 1;
                        }
                    }
                }
                data.push(if n > 0 { (sum / n as f64) as f32 } else { fill });
            }
        }

        RasterGrid {
            width: dst_w,
            height: dst_h,
            data,
            transform: GeoTransform::new(
                self.transform.origin_x,
                self.transform.origin_y,
                self.transform.pixel_width * self.width as f64 / dst_w as f64,
                self.transform.pixel_height * self.height as f64 / dst_h as f64,
            ),
            nodata: self.nodata,
        }
    }
}
