// Link length estimation from a cone link-length run

use crate::dataset::CalibrationDataset;
use crate::kinematics::{KinematicParams, LARGE_LINK_LENGTH, ParamsError};
use crate::position::{Axis, PartialPosition, Position};
use serde::Serialize;
use thiserror::Error;

/// Spread (mm) below which an estimate is considered trustworthy.
pub const CONSISTENT_DEVIATION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkLengthEstimate {
    pub value: f64,
    /// Largest disagreement between the individual measurements.
    pub deviation: f64,
}

impl LinkLengthEstimate {
    pub fn is_consistent(&self) -> bool {
        self.deviation < CONSISTENT_DEVIATION
    }

    pub fn is_unusually_large(&self) -> bool {
        self.value > LARGE_LINK_LENGTH
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EstimateError {
    #[error("no reference position captured")]
    MissingReference,

    #[error("no usable measurement at {axis}{angle}")]
    MissingMeasurement { axis: Axis, angle: f64 },

    #[error("estimated link length is not usable: {0}")]
    Invalid(#[from] ParamsError),
}

fn measured_xy(dataset: &CalibrationDataset, axis: Axis, angle: f64) -> Result<(f64, f64), EstimateError> {
    let missing = || EstimateError::MissingMeasurement { axis, angle };
    let point = dataset
        .point_at(axis, angle)
        .filter(|p| !p.skipped)
        .ok_or_else(missing)?;
    let PartialPosition { x, y, .. } = point.actual;
    Ok((x.ok_or_else(missing)?, y.ok_or_else(missing)?))
}

fn horizontal_distance(from: &Position, to: (f64, f64)) -> f64 {
    ((to.0 - from.x).powi(2) + (to.1 - from.y).powi(2)).sqrt()
}

/// la from the A90/A180/A270 tip positions. A180 sits at twice la from A0.
pub fn estimate_la(dataset: &CalibrationDataset) -> Result<LinkLengthEstimate, EstimateError> {
    let reference = dataset.reference.ok_or(EstimateError::MissingReference)?;
    let d90 = horizontal_distance(&reference, measured_xy(dataset, Axis::A, 90.0)?);
    let d180 = horizontal_distance(&reference, measured_xy(dataset, Axis::A, 180.0)?);
    let d270 = horizontal_distance(&reference, measured_xy(dataset, Axis::A, 270.0)?);

    let estimates = [d90, d180 / 2.0, d270];
    let value = estimates.iter().sum::<f64>() / estimates.len() as f64;
    let deviation = estimates
        .iter()
        .map(|e| (e - value).abs())
        .fold(0.0, f64::max);
    Ok(LinkLengthEstimate { value, deviation })
}

/// lb from the B-90/B90 tip displacement, with their asymmetry.
pub fn estimate_lb(dataset: &CalibrationDataset) -> Result<LinkLengthEstimate, EstimateError> {
    let reference = dataset.reference.ok_or(EstimateError::MissingReference)?;
    let neg = horizontal_distance(&reference, measured_xy(dataset, Axis::B, -90.0)?);
    let pos = horizontal_distance(&reference, measured_xy(dataset, Axis::B, 90.0)?);
    Ok(LinkLengthEstimate {
        value: (neg + pos) / 2.0,
        deviation: (neg - pos).abs(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinkLengthEstimates {
    pub la: LinkLengthEstimate,
    pub lb: LinkLengthEstimate,
}

impl LinkLengthEstimates {
    pub fn to_params(&self) -> Result<KinematicParams, EstimateError> {
        Ok(KinematicParams::new(self.la.value, self.lb.value)?)
    }
}

pub fn estimate_link_lengths(dataset: &CalibrationDataset) -> Result<LinkLengthEstimates, EstimateError> {
    Ok(LinkLengthEstimates {
        la: estimate_la(dataset)?,
        lb: estimate_lb(dataset)?,
    })
}
