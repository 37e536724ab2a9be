//! Joining hex tables from different datasets.

use std::str::FromStr;

use h3o::LatLng;
use serde::{Deserialize, Serialize};

use crate::{Aggregation, HexError, HexResult, HexTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Only cells present on both sides.
    #[default]
    Inner,
    /// Every left cell, with the right value when present.
    Left,
}

impl FromStr for JoinKind {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinKind::Inner),
            "left" => Ok(JoinKind::Left),
            _ => Err(HexError::UnknownJoinKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub hex: String,
    pub lat: f64,
    pub lng: f64,
    pub left: Option<f64>,
    pub right: Option<f64>,
}

/// Join two tables on cell id.
///
/// Tables at different resolutions are both rolled up to the coarser one
/// first. Each side is read out with its own aggregation.
pub fn join(
    left: &HexTable,
    right: &HexTable,
    left_agg: Aggregation,
    right_agg: Aggregation,
    kind: JoinKind,
) -> HexResult<Vec<JoinedRow>> {
    let common = if u8::from(left.resolution()) <= u8::from(right.resolution()) {
        left.resolution()
    } else {
        right.resolution()
    };
    let left = left.rollup(common)?;
    let right = right.rollup(common)?;

    let rows = left
        .cells()
        .filter_map(|l| {
            let r = right.get(&l.cell);
            if kind == JoinKind::Inner && r.is_none() {
                return None;
            }
            let center = LatLng::from(l.cell);
            Some(JoinedRow {
                hex: l.cell.to_string(),
                lat: center.lat(),
                lng: center.lng(),
                left: Some(l.value(left_agg)),
                right: r.map(|r| r.value(right_agg)),
            })
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate_points, PointValue};
    use h3o::Resolution;

    #[test]
    fn test_inner_vs_left() {
        let a = [
            PointValue::new(40.0, -74.0, 1.0),
            PointValue::new(-20.0, 30.0, 2.0),
        ];
        let b = [PointValue::new(40.0, -74.0, 10.0)];
        let left = aggregate_points(&a, Resolution::Six);
        let right = aggregate_points(&b, Resolution::Six);

        let inner = join(&left, &right, Aggregation::Sum, Aggregation::Sum, JoinKind::Inner).unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].left, Some(1.0));
        assert_eq!(inner[0].right, Some(10.0));

        let outer = join(&left, &right, Aggregation::Sum, Aggregation::Sum, JoinKind::Left).unwrap();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer.iter().filter(|r| r.right.is_none()).count(), 1);
    }

    #[test]
    fn test_join_across_resolutions() {
        let a = [PointValue::new(51.5, -0.12, 4.0), PointValue::new(51.5, -0.12, 6.0)];
        let b = [PointValue::new(51.5, -0.12, 1.0)];
        let fine = aggregate_points(&a, Resolution::Ten);
        let coarse = aggregate_points(&b, Resolution::Five);

        let rows = join(&fine, &coarse, Aggregation::Mean, Aggregation::Count, JoinKind::Inner).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].left, Some(5.0));
        assert_eq!(rows[0].right, Some(1.0));
        let cell: h3o::CellIndex = rows[0].hex.parse().unwrap();
        assert_eq!(cell.resolution(), Resolution::Five);
    }

    #[test]
    fn test_join_kind_parse() {
        assert_eq!("LEFT".parse::<JoinKind>().unwrap(), JoinKind::Left);
        assert!("outer".parse::<JoinKind>().is_err());
    }
}
