//! Zoom level → H3 resolution and raster decimation heuristics.

use geo_common::{estimate_zoom, BoundingBox};
use h3o::Resolution;

use crate::{HexError, HexResult};

/// Finest H3 resolution.
const H3_MAX_RES: u8 = 15;

/// Convert a raw resolution number, rejecting values above 15.
pub fn to_resolution(res: u8) -> HexResult<Resolution> {
    Resolution::try_from(res).map_err(|_| HexError::InvalidResolution(res))
}

/// Linear zoom → resolution mapping with clamps:
/// `res = clamp(floor(offset + zoom / divisor), min_res, max_res)`.
///
/// The defaults (`3 + z / 1.5`, clamped to `[2, 12]`) keep a few dozen hexes
/// across a 256px tile at every zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionHeuristic {
    offset: f64,
    divisor: f64,
    min_res: u8,
    max_res: u8,
}

impl Default for ResolutionHeuristic {
    fn default() -> Self {
        Self {
            offset: 3.0,
            divisor: 1.5,
            min_res: 2,
            max_res: 12,
        }
    }
}

impl ResolutionHeuristic {
    pub fn new(offset: f64, divisor: f64, min_res: u8, max_res: u8) -> HexResult<Self> {
        if !offset.is_finite() {
            return Err(HexError::InvalidHeuristic(format!(
                "offset must be finite, got {}",
                offset
            )));
        }
        if !(divisor.is_finite() && divisor > 0.0) {
            return Err(HexError::InvalidHeuristic(format!(
                "divisor must be positive, got {}",
                divisor
            )));
        }
        if max_res > H3_MAX_RES {
            return Err(HexError::InvalidResolution(max_res));
        }
        if min_res > max_res {
            return Err(HexError::InvalidHeuristic(format!(
                "min_res {} exceeds max_res {}",
                min_res, max_res
            )));
        }
        Ok(Self {
            offset,
            divisor,
            min_res,
            max_res,
        })
    }

    pub fn min_res(&self) -> u8 {
        self.min_res
    }

    pub fn max_res(&self) -> u8 {
        self.max_res
    }

    /// Raw resolution number for a (possibly fractional) zoom.
    ///
    /// Non-decreasing in `zoom`; NaN zooms fall back to `min_res`.
    pub fn level_for_zoom(&self, zoom: f64) -> u8 {
        if zoom.is_nan() {
            return self.min_res;
        }
        let raw = (self.offset + zoom / self.divisor).floor();
        raw.clamp(self.min_res as f64, self.max_res as f64) as u8
    }

    pub fn resolution_for_zoom(&self, zoom: f64) -> Resolution {
        // level_for_zoom never exceeds max_res, which new() capped at 15.
        Resolution::try_from(self.level_for_zoom(zoom)).unwrap_or(Resolution::Fifteen)
    }

    /// Resolution for the zoom at which `bbox` fills a `viewport_px` viewport.
    pub fn resolution_for_bbox(
        &self,
        bbox: &BoundingBox,
        tile_size_px: u32,
        viewport_px: u32,
    ) -> Resolution {
        let zoom = estimate_zoom(bbox, tile_size_px, viewport_px);
        self.resolution_for_zoom(zoom as f64)
    }
}

/// Zoom → raster decimation factor: read coarser data when zoomed out.
///
/// `factor = clamp(2^(full_res_zoom - zoom), 1, max_factor)`, non-increasing in zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimationHeuristic {
    pub full_res_zoom: u32,
    pub max_factor: usize,
}

impl Default for DecimationHeuristic {
    fn default() -> Self {
        Self {
            full_res_zoom: 12,
            max_factor: 64,
        }
    }
}

impl DecimationHeuristic {
    pub fn factor_for_zoom(&self, zoom: u32) -> usize {
        if zoom >= self.full_res_zoom {
            return 1;
        }
        let steps = (self.full_res_zoom - zoom).min(usize::BITS - 1);
        (1usize << steps).clamp(1, self.max_factor.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_formula() {
        let h = ResolutionHeuristic::default();
        assert_eq!(h.level_for_zoom(0.0), 3);
        assert_eq!(h.level_for_zoom(3.0), 5);
        assert_eq!(h.level_for_zoom(10.0), 9);
        assert_eq!(h.level_for_zoom(14.0), 12);
        assert_eq!(h.level_for_zoom(22.0), 12);
        assert_eq!(h.level_for_zoom(-5.0), 2);
        assert_eq!(h.level_for_zoom(f64::NAN), 2);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            ResolutionHeuristic::new(3.0, 0.0, 2, 12),
            Err(HexError::InvalidHeuristic(_))
        ));
        assert!(matches!(
            ResolutionHeuristic::new(3.0, 1.5, 2, 16),
            Err(HexError::InvalidResolution(16))
        ));
        assert!(matches!(
            ResolutionHeuristic::new(3.0, 1.5, 9, 4),
            Err(HexError::InvalidHeuristic(_))
        ));
    }

    #[test]
    fn test_to_resolution() {
        assert_eq!(to_resolution(7).unwrap(), Resolution::Seven);
        assert!(matches!(to_resolution(16), Err(HexError::InvalidResolution(16))));
    }

    #[test]
    fn test_decimation() {
        let d = DecimationHeuristic::default();
        assert_eq!(d.factor_for_zoom(14), 1);
        assert_eq!(d.factor_for_zoom(12), 1);
        assert_eq!(d.factor_for_zoom(10), 4);
        assert_eq!(d.factor_for_zoom(0), 64);
    }
}
