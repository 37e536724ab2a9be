//! Cells covering a bounding box.

use std::collections::BTreeSet;

use geo_common::BoundingBox;
use h3o::{CellIndex, LatLng, Resolution};

use crate::{HexError, HexResult};

/// Upper bound on the number of cells a single cover may produce.
pub const MAX_COVER_CELLS: usize = 500_000;

const KM_PER_DEGREE: f64 = 111.32;

/// Lon/lat extent of a cell's boundary.
fn cell_extent(cell: CellIndex) -> BoundingBox {
    let boundary = cell.boundary();
    let mut extent = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for v in boundary.iter() {
        extent.min_x = extent.min_x.min(v.lng());
        extent.min_y = extent.min_y.min(v.lat());
        extent.max_x = extent.max_x.max(v.lng());
        extent.max_y = extent.max_y.max(v.lat());
    }
    extent
}

/// All cells at `resolution` whose extent intersects `bbox`.
///
/// Cells are found by sampling the box at half the cell edge length, then
/// widened by one ring and filtered on their boundary extent, so cells that
/// only clip a corner of the box are included too. The result is sorted.
pub fn cells_for_bbox(bbox: &BoundingBox, resolution: Resolution) -> HexResult<Vec<CellIndex>> {
    let bbox = BoundingBox::new(
        bbox.min_x.max(-180.0),
        bbox.min_y.max(-90.0),
        bbox.max_x.min(180.0),
        bbox.max_y.min(90.0),
    );

    // A degree of longitude is widest nearest the equator; size the step there.
    let equator_lat = if bbox.min_y <= 0.0 && bbox.max_y >= 0.0 {
        0.0
    } else {
        bbox.min_y.abs().min(bbox.max_y.abs())
    };
    let lng_scale = equator_lat.to_radians().cos().max(0.01);
    let width_km = bbox.width() * KM_PER_DEGREE * lng_scale;
    let height_km = bbox.height() * KM_PER_DEGREE;
    let estimated = (width_km * height_km / resolution.area_km2()).ceil() as usize;
    if estimated > MAX_COVER_CELLS {
        return Err(HexError::CoverTooLarge {
            requested: estimated,
            limit: MAX_COVER_CELLS,
        });
    }

    let step_km = resolution.edge_length_km() / 2.0;
    let step_lat = step_km / KM_PER_DEGREE;
    let step_lng = step_lat / lng_scale;
    let n_lng = (bbox.width() / step_lng).ceil() as usize + 1;
    let n_lat = (bbox.height() / step_lat).ceil() as usize + 1;

    let mut seeds = BTreeSet::new();
    for i in 0..n_lat {
        let lat = (bbox.min_y + i as f64 * step_lat).min(bbox.max_y);
        for j in 0..n_lng {
            let lng = (bbox.min_x + j as f64 * step_lng).min(bbox.max_x);
            if let Ok(ll) = LatLng::new(lat, lng) {
                seeds.insert(ll.to_cell(resolution));
            }
        }
    }

    let mut cover = BTreeSet::new();
    for seed in &seeds {
        for cell in seed.grid_disk::<Vec<_>>(1) {
            if cover.contains(&cell) {
                continue;
            }
            if seeds.contains(&cell) || cell_extent(cell).intersects(&bbox) {
                cover.insert(cell);
            }
        }
    }

    Ok(cover.into_iter().collect())
}
