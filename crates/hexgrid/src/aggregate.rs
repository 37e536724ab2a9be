//! Grouped aggregation of point and raster values into H3 cells.
//!
//! A [`HexTable`] keeps running count/sum/min/max per cell, so any of the
//! supported [`Aggregation`]s can be read out afterwards and tables can be
//! merged or rolled up to coarser resolutions without revisiting the input.

use std::collections::BTreeMap;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};
use raster::RasterGrid;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{HexError, HexResult};

/// A value at a lon/lat location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    pub lat: f64,
    pub lng: f64,
    pub value: f64,
}

impl PointValue {
    pub fn new(lat: f64, lng: f64, value: f64) -> Self {
        Self { lat, lng, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Sum,
    #[default]
    Mean,
    Min,
    Max,
}

impl FromStr for Aggregation {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(Aggregation::Count),
            "sum" => Ok(Aggregation::Sum),
            "mean" | "avg" => Ok(Aggregation::Mean),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            _ => Err(HexError::UnknownAggregation(s.to_string())),
        }
    }
}

/// Running statistics for one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexCell {
    pub cell: CellIndex,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl HexCell {
    fn new(cell: CellIndex, value: f64) -> Self {
        Self {
            cell,
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn absorb(&mut self, other: &HexCell) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn value(&self, agg: Aggregation) -> f64 {
        match agg {
            Aggregation::Count => self.count as f64,
            Aggregation::Sum => self.sum,
            Aggregation::Mean => self.mean(),
            Aggregation::Min => self.min,
            Aggregation::Max => self.max,
        }
    }
}

/// How many inputs were binned and how many were dropped (no-data,
/// non-finite values or invalid coordinates).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub accepted: u64,
    pub skipped: u64,
}

/// One output row: the cell id as an H3 string plus its center and value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HexRow {
    pub hex: String,
    pub lat: f64,
    pub lng: f64,
    pub count: u64,
    pub value: f64,
}

/// Hex bins at a single resolution, ordered by cell index.
#[derive(Debug, Clone, PartialEq)]
pub struct HexTable {
    resolution: Resolution,
    cells: BTreeMap<CellIndex, HexCell>,
    stats: AggregateStats,
}

impl HexTable {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            cells: BTreeMap::new(),
            stats: AggregateStats::default(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    pub fn get(&self, cell: &CellIndex) -> Option<&HexCell> {
        self.cells.get(cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = &HexCell> {
        self.cells.values()
    }

    /// Sum of per-cell counts; equals `stats().accepted`.
    pub fn total_count(&self) -> u64 {
        self.cells.values().map(|c| c.count).sum()
    }

    /// Bin one value. Returns `false` (and counts a skip) for invalid input:
    /// non-finite values and coordinates outside lat -90..=90, lng -180..=180.
    pub fn insert(&mut self, lat: f64, lng: f64, value: f64) -> bool {
        let on_globe = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng);
        if !value.is_finite() || !on_globe {
            self.stats.skipped += 1;
            return false;
        }
        let Ok(ll) = LatLng::new(lat, lng) else {
            self.stats.skipped += 1;
            return false;
        };
        let cell = ll.to_cell(self.resolution);
        self.insert_cell(cell, value);
        true
    }

    fn insert_cell(&mut self, cell: CellIndex, value: f64) {
        self.stats.accepted += 1;
        self.cells
            .entry(cell)
            .and_modify(|c| c.push(value))
            .or_insert_with(|| HexCell::new(cell, value));
    }

    fn absorb_cell(&mut self, key: CellIndex, incoming: &HexCell) {
        self.cells
            .entry(key)
            .and_modify(|c| c.absorb(incoming))
            .or_insert(HexCell { cell: key, ..*incoming });
    }

    /// Merge another table at the same resolution into this one.
    pub fn merge(&mut self, other: HexTable) -> HexResult<()> {
        if other.resolution != self.resolution {
            return Err(HexError::InvalidRollup {
                from: u8::from(other.resolution),
                to: u8::from(self.resolution),
            });
        }
        for (key, cell) in &other.cells {
            self.absorb_cell(*key, cell);
        }
        self.stats.accepted += other.stats.accepted;
        self.stats.skipped += other.stats.skipped;
        Ok(())
    }

    /// Re-group by parent cell at a coarser (or equal) resolution.
    pub fn rollup(&self, coarser: Resolution) -> HexResult<HexTable> {
        if coarser == self.resolution {
            return Ok(self.clone());
        }
        if u8::from(coarser) > u8::from(self.resolution) {
            return Err(HexError::InvalidRollup {
                from: u8::from(self.resolution),
                to: u8::from(coarser),
            });
        }

        let mut out = HexTable::new(coarser);
        out.stats = self.stats;
        for (key, cell) in &self.cells {
            let parent = key.parent(coarser).ok_or(HexError::InvalidRollup {
                from: u8::from(self.resolution),
                to: u8::from(coarser),
            })?;
            out.absorb_cell(parent, cell);
        }
        Ok(out)
    }

    /// Rows for serialization, ordered by cell index.
    pub fn to_rows(&self, agg: Aggregation) -> Vec<HexRow> {
        self.cells
            .values()
            .map(|c| {
                let center = LatLng::from(c.cell);
                HexRow {
                    hex: c.cell.to_string(),
                    lat: center.lat(),
                    lng: center.lng(),
                    count: c.count,
                    value: c.value(agg),
                }
            })
            .collect()
    }
}

/// Bin `(lat, lng, value)` points into cells at `resolution`.
pub fn aggregate_points<'a>(
    points: impl IntoIterator<Item = &'a PointValue>,
    resolution: Resolution,
) -> HexTable {
    let mut table = HexTable::new(resolution);
    for p in points {
        table.insert(p.lat, p.lng, p.value);
    }
    table
}

/// Bin every valid pixel center of `grid` into cells at `resolution`.
///
/// Rows are processed in parallel and the partial tables merged. Cells,
/// counts, min and max are the same on every run; float sums can differ in
/// the last bits with how rayon splits the rows.
pub fn aggregate_raster(grid: &RasterGrid, resolution: Resolution) -> HexTable {
    let table = (0..grid.height)
        .into_par_iter()
        .fold(
            || HexTable::new(resolution),
            |mut table, row| {
                for col in 0..grid.width {
                    match grid.value_at(col, row) {
                        Some(v) => {
                            let (lng, lat) = grid.pixel_center(col, row);
                            table.insert(lat, lng, v as f64);
                        }
                        None => table.stats.skipped += 1,
                    }
                }
                table
            },
        )
        .reduce(
            || HexTable::new(resolution),
            |mut a, b| {
                for (key, cell) in &b.cells {
                    a.absorb_cell(*key, cell);
                }
                a.stats.accepted += b.stats.accepted;
                a.stats.skipped += b.stats.skipped;
                a
            },
        );

    debug!(
        width = grid.width,
        height = grid.height,
        resolution = u8::from(resolution),
        cells = table.len(),
        accepted = table.stats.accepted,
        skipped = table.stats.skipped,
        "Aggregated raster to hexes"
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aggregation() {
        assert_eq!("MEAN".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!("avg".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert!(matches!(
            "median".parse::<Aggregation>(),
            Err(HexError::UnknownAggregation(_))
        ));
    }

    #[test]
    fn test_same_point_lands_in_one_cell() {
        let points = [
            PointValue::new(37.7749, -122.4194, 1.0),
            PointValue::new(37.7749, -122.4194, 3.0),
        ];
        let table = aggregate_points(&points, Resolution::Nine);
        assert_eq!(table.len(), 1);
        let cell = table.cells().next().unwrap();
        assert_eq!(cell.count, 2);
        assert_eq!(cell.value(Aggregation::Mean), 2.0);
        assert_eq!(cell.value(Aggregation::Min), 1.0);
        assert_eq!(cell.value(Aggregation::Max), 3.0);
        assert_eq!(cell.value(Aggregation::Sum), 4.0);
    }

    #[test]
    fn test_invalid_inputs_are_skipped() {
        let points = [
            PointValue::new(10.0, 10.0, f64::NAN),
            PointValue::new(f64::INFINITY, 10.0, 1.0),
            PointValue::new(120.0, 10.0, 1.0),
            PointValue::new(10.0, 400.0, 1.0),
            PointValue::new(-90.5, 0.0, 1.0),
            PointValue::new(10.0, 10.0, 1.0),
        ];
        let table = aggregate_points(&points, Resolution::Five);
        assert_eq!(
            table.stats(),
            AggregateStats {
                accepted: 1,
                skipped: 5
            }
        );
        assert_eq!(table.total_count(), 1);
    }

    #[test]
    fn test_rollup_preserves_totals() {
        let points: Vec<PointValue> = (0..50)
            .map(|i| PointValue::new(48.0 + i as f64 * 0.01, 2.0 + i as f64 * 0.01, i as f64))
            .collect();
        let fine = aggregate_points(&points, Resolution::Nine);
        let coarse = fine.rollup(Resolution::Five).unwrap();
        assert!(coarse.len() <= fine.len());
        assert_eq!(coarse.total_count(), 50);
        let total: f64 = coarse.cells().map(|c| c.sum).sum();
        assert_eq!(total, (0..50).sum::<i32>() as f64);
    }

    #[test]
    fn test_rollup_to_finer_fails() {
        let table = HexTable::new(Resolution::Four);
        assert!(matches!(
            table.rollup(Resolution::Six),
            Err(HexError::InvalidRollup { from: 4, to: 6 })
        ));
    }

    #[test]
    fn test_rows_carry_cell_center() {
        let points = [PointValue::new(-33.86, 151.21, 5.0)];
        let rows = aggregate_points(&points, Resolution::Seven).to_rows(Aggregation::Sum);
        assert_eq!(rows.len(), 1);
        let cell: CellIndex = rows[0].hex.parse().unwrap();
        assert_eq!(cell.resolution(), Resolution::Seven);
        assert!((rows[0].lat + 33.86).abs() < 0.05);
        assert!((rows[0].lng - 151.21).abs() < 0.05);
        assert_eq!(rows[0].value, 5.0);
    }
}
