// Merging measurement sets and summarising their errors

use crate::dataset::{CalibrationDataset, CalibrationPoint};
use serde::{Deserialize, Serialize};

/// Combine an XY run and a Z run of the same axis into one set of points.
///
/// Points are matched on axis and angle. Where both runs have a point, X/Y
/// come from the XY run and Z from the Z run; a point only one run has is
/// kept as it is. The result is sorted by angle, then axis, whatever order
/// the inputs are in. Only the first point per angle of each run is used.
pub fn merge_datasets(xy: &[CalibrationPoint], z: &[CalibrationPoint]) -> Vec<CalibrationPoint> {
    let mut merged: Vec<CalibrationPoint> = Vec::new();
    for point in xy {
        if !merged.iter().any(|m| same_step(m, point)) {
            merged.push(point.clone());
        }
    }

    for (i, point) in z.iter().enumerate() {
        if z[..i].iter().any(|earlier| same_step(earlier, point)) {
            continue;
        }
        match merged.iter_mut().find(|m| same_step(m, point)) {
            Some(m) => take_z(m, point),
            None => merged.push(point.clone()),
        }
    }

    merged.sort_by(|a, b| {
        a.angle
            .total_cmp(&b.angle)
            .then_with(|| a.axis.letter().cmp(&b.axis.letter()))
    });
    merged
}

fn same_step(a: &CalibrationPoint, b: &CalibrationPoint) -> bool {
    a.axis == b.axis && a.angle == b.angle
}

fn take_z(point: &mut CalibrationPoint, from: &CalibrationPoint) {
    point.error.z = from.error.z;
    point.expected.z = from.expected.z;
    point.actual.z = from.actual.z;
    point.skipped &= from.skipped;
    point.flagged |= from.flagged;
}

/// Error summary for one axis sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisStatistics {
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
    pub rms: f64,
    pub measured: usize,
    pub skipped: usize,
}

/// Max absolute error per component and the RMS of the error vector length,
/// over points that were not skipped.
pub fn compute_statistics(points: &[CalibrationPoint]) -> AxisStatistics {
    let mut stats = AxisStatistics::default();
    let mut sum_sq = 0.0;

    for point in points {
        if point.skipped {
            stats.skipped += 1;
            continue;
        }
        stats.measured += 1;
        let abs = |v: Option<f64>| v.map_or(0.0, f64::abs);
        stats.max_x = stats.max_x.max(abs(point.error.x));
        stats.max_y = stats.max_y.max(abs(point.error.y));
        stats.max_z = stats.max_z.max(abs(point.error.z));
        sum_sq += point.error.squared_norm();
    }

    if stats.measured > 0 {
        stats.rms = (sum_sq / stats.measured as f64).sqrt();
    }
    stats
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatistics {
    pub a_axis: AxisStatistics,
    pub b_axis: AxisStatistics,
}

impl SessionStatistics {
    pub fn from_dataset(dataset: &CalibrationDataset) -> Self {
        Self {
            a_axis: compute_statistics(&dataset.a_axis_points),
            b_axis: compute_statistics(&dataset.b_axis_points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ErrorVector;
    use crate::position::{Axis, PartialPosition};

    fn point(angle: f64, x: Option<f64>, y: Option<f64>, z: Option<f64>) -> CalibrationPoint {
        let expected = PartialPosition {
            x: x.map(|_| 100.0),
            y: y.map(|_| 100.0),
            z: z.map(|_| 0.0),
            ..PartialPosition::default()
        };
        CalibrationPoint {
            angle,
            axis: Axis::A,
            expected,
            actual: expected,
            error: ErrorVector { x, y, z },
            skipped: false,
            flagged: false,
        }
    }

    #[test]
    fn empty_statistics_are_zero() {
        assert_eq!(compute_statistics(&[]), AxisStatistics::default());
    }

    #[test]
    fn rms_over_measured_points() {
        let points = vec![
            point(30.0, Some(3.0), Some(-4.0), None),
            point(60.0, Some(0.0), Some(0.0), Some(0.0)),
        ];
        let stats = compute_statistics(&points);
        assert_eq!(stats.max_x, 3.0);
        assert_eq!(stats.max_y, 4.0);
        assert_eq!(stats.max_z, 0.0);
        assert!((stats.rms - (25.0f64 / 2.0).sqrt()).abs() < 1e-12);
        assert_eq!(stats.measured, 2);
    }

    #[test]
    fn skipped_points_only_count() {
        let mut skipped = point(90.0, Some(0.0), Some(0.0), None);
        skipped.skipped = true;
        let mut big = point(120.0, Some(9.0), None, None);
        big.skipped = true;
        let points = vec![point(30.0, Some(1.0), None, None), skipped, big];
        let stats = compute_statistics(&points);
        assert_eq!(stats.max_x, 1.0);
        assert_eq!(stats.rms, 1.0);
        assert_eq!(stats.measured, 1);
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn merge_takes_xy_and_z_from_their_runs() {
        let xy = vec![
            point(60.0, Some(0.2), Some(-0.1), None),
            point(30.0, Some(0.1), Some(0.3), None),
        ];
        let z = vec![point(30.0, None, None, Some(-0.05)), point(90.0, None, None, Some(0.4))];

        let merged = merge_datasets(&xy, &z);
        let angles: Vec<f64> = merged.iter().map(|p| p.angle).collect();
        assert_eq!(angles, vec![30.0, 60.0, 90.0]);
        assert_eq!(
            merged[0].error,
            ErrorVector {
                x: Some(0.1),
                y: Some(0.3),
                z: Some(-0.05),
            }
        );
        assert_eq!(merged[1].error.z, None);
        assert_eq!(merged[2].error.x, None);
        assert_eq!(merged[2].error.z, Some(0.4));
    }

    #[test]
    fn merge_uses_each_run_for_its_components() {
        let xy = vec![point(30.0, Some(0.1), Some(0.1), Some(5.0))];
        let z = vec![point(30.0, Some(0.9), Some(0.9), Some(-0.2))];

        let merged = merge_datasets(&xy, &z);
        assert_eq!(
            merged[0].error,
            ErrorVector {
                x: Some(0.1),
                y: Some(0.1),
                z: Some(-0.2),
            }
        );
        assert_eq!(merged[0].expected.z, Some(0.0));
    }

    #[test]
    fn merge_ignores_input_order() {
        let mut skipped = point(45.0, Some(0.0), Some(0.0), None);
        skipped.skipped = true;
        let xy = vec![
            point(0.0, Some(0.5), Some(0.5), None),
            skipped,
            point(15.0, Some(0.2), Some(-0.3), None),
        ];
        let z = vec![
            point(15.0, None, None, Some(0.1)),
            point(45.0, None, None, Some(0.7)),
            point(0.0, None, None, Some(-2.0)),
        ];
        let reversed = |points: &[CalibrationPoint]| points.iter().rev().cloned().collect::<Vec<_>>();
        assert_eq!(
            merge_datasets(&xy, &z),
            merge_datasets(&reversed(&xy), &reversed(&z))
        );

        let merged = merge_datasets(&xy, &z);
        assert_eq!(merged[0].error.z, Some(-2.0));
        let at_45 = merged.iter().find(|p| p.angle == 45.0).unwrap();
        assert_eq!(at_45.error.x, Some(0.0));
        assert_eq!(at_45.error.z, Some(0.7));
        assert!(!at_45.skipped);
    }
}
