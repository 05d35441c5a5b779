// Recorded measurements of one calibration run

use crate::kinematics::KinematicParams;
use crate::position::{Axis, PartialPosition, Position};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deviation per axis; `None` means the component was not measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorVector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl ErrorVector {
    pub fn components(&self) -> impl Iterator<Item = f64> {
        [self.x, self.y, self.z].into_iter().flatten()
    }

    pub fn squared_norm(&self) -> f64 {
        self.components().map(|v| v * v).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub angle: f64,
    pub axis: Axis,
    pub expected: PartialPosition,
    pub actual: PartialPosition,
    pub error: ErrorVector,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub flagged: bool,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn diff(actual: Option<f64>, expected: Option<f64>) -> Option<f64> {
    Some(round2(actual?) - round2(expected?))
}

impl CalibrationPoint {
    /// A measured point. Both positions are rounded to 0.01 mm before the
    /// error is taken, for every axis present in both.
    pub fn measured(
        angle: f64,
        axis: Axis,
        expected: PartialPosition,
        actual: PartialPosition,
    ) -> Self {
        let error = ErrorVector {
            x: diff(actual.x, expected.x),
            y: diff(actual.y, expected.y),
            z: diff(actual.z, expected.z),
        };
        Self {
            angle,
            axis,
            expected,
            actual,
            error,
            skipped: false,
            flagged: false,
        }
    }

    /// A skipped point carries zero error on the axes it was expected on.
    pub fn skipped(angle: f64, axis: Axis, expected: PartialPosition) -> Self {
        let zero = |v: Option<f64>| v.map(|_| 0.0);
        Self {
            angle,
            axis,
            expected,
            actual: expected,
            error: ErrorVector {
                x: zero(expected.x),
                y: zero(expected.y),
                z: zero(expected.z),
            },
            skipped: true,
            flagged: false,
        }
    }

    pub fn flagged(mut self) -> Self {
        self.flagged = true;
        self
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DatasetError {
    #[error("reference position is already set for this run")]
    ReferenceAlreadySet,

    #[error("cannot record a measurement before the reference is captured")]
    MissingReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationDataset {
    pub reference: Option<Position>,
    pub a_axis_points: Vec<CalibrationPoint>,
    pub b_axis_points: Vec<CalibrationPoint>,
    pub kinematic_params: KinematicParams,
    /// Contact height captured while probing the reference (Z-probe runs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_reference_z: Option<f64>,
    /// Height confirmed by the operator before the B-axis Z sweep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b_axis_z_reference: Option<f64>,
}

impl CalibrationDataset {
    pub fn new(kinematic_params: KinematicParams) -> Self {
        Self {
            reference: None,
            a_axis_points: Vec::new(),
            b_axis_points: Vec::new(),
            kinematic_params,
            probe_reference_z: None,
            b_axis_z_reference: None,
        }
    }

    pub fn set_reference(&mut self, reference: Position) -> Result<(), DatasetError> {
        if self.reference.is_some() {
            return Err(DatasetError::ReferenceAlreadySet);
        }
        self.reference = Some(reference);
        Ok(())
    }

    pub fn push(&mut self, point: CalibrationPoint) -> Result<(), DatasetError> {
        if self.reference.is_none() && !point.skipped {
            return Err(DatasetError::MissingReference);
        }
        match point.axis {
            Axis::A => self.a_axis_points.push(point),
            Axis::B => self.b_axis_points.push(point),
        }
        Ok(())
    }

    pub fn points(&self, axis: Axis) -> &[CalibrationPoint] {
        match axis {
            Axis::A => &self.a_axis_points,
            Axis::B => &self.b_axis_points,
        }
    }

    pub fn point_at(&self, axis: Axis, angle: f64) -> Option<&CalibrationPoint> {
        self.points(axis).iter().find(|p| p.angle == angle)
    }

    pub fn len(&self) -> usize {
        self.a_axis_points.len() + self.b_axis_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start over with the same parameters.
    pub fn clear(&mut self) {
        *self = Self::new(self.kinematic_params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy(x: f64, y: f64) -> PartialPosition {
        PartialPosition {
            x: Some(x),
            y: Some(y),
            ..PartialPosition::default()
        }
    }

    #[test]
    fn error_rounds_before_subtracting() {
        let point = CalibrationPoint::measured(30.0, Axis::A, xy(10.004, 5.0), xy(10.126, 4.996));
        assert_eq!(point.error.x, Some(10.13 - 10.0));
        assert_eq!(point.error.y, Some(5.0 - 5.0));
        assert_eq!(point.error.z, None);
    }

    #[test]
    fn skipped_point_has_zero_error_on_expected_axes() {
        let point = CalibrationPoint::skipped(60.0, Axis::B, xy(1.0, 2.0));
        assert!(point.skipped);
        assert_eq!(
            point.error,
            ErrorVector {
                x: Some(0.0),
                y: Some(0.0),
                z: None,
            }
        );
    }

    #[test]
    fn reference_is_set_once_and_required() {
        let params = KinematicParams { la: 0.0, lb: 40.0 };
        let mut dataset = CalibrationDataset::new(params);
        let point = CalibrationPoint::measured(30.0, Axis::A, xy(0.0, 0.0), xy(0.1, 0.0));
        assert_eq!(
            dataset.push(point.clone()),
            Err(DatasetError::MissingReference)
        );

        dataset.set_reference(Position::default()).unwrap();
        assert_eq!(
            dataset.set_reference(Position::default()),
            Err(DatasetError::ReferenceAlreadySet)
        );
        dataset.push(point).unwrap();
        assert_eq!(dataset.points(Axis::A).len(), 1);
        assert!(dataset.point_at(Axis::A, 30.0).is_some());

        dataset.clear();
        assert!(dataset.is_empty());
        assert_eq!(dataset.reference, None);
        assert_eq!(dataset.kinematic_params, params);
    }
}
