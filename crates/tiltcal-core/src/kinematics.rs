// Forward and inverse kinematics of the two-axis rotating head

use crate::position::{Axis, Position};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod compound;
pub mod cone;

/// Fallback target used when the model cannot produce a usable position.
pub const SAFE_POSITION: Position = Position::new(100.0, 100.0, 50.0, 0.0, 0.0);

/// Link lengths above this are accepted but almost certainly a typo.
pub const LARGE_LINK_LENGTH: f64 = 500.0;

/// Largest rotation, in degrees, the model will evaluate.
pub const MAX_ANGLE: f64 = 360.0;

/// Distances (mm) from each rotation axis to the nozzle tip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicParams {
    pub la: f64,
    pub lb: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("link length {name} is not a finite number")]
    NonFinite { name: &'static str },

    #[error("link length la must be >= 0 mm, got {0}")]
    NegativeLa(f64),

    #[error("link length lb must be > 0 mm, got {0}")]
    NonPositiveLb(f64),
}

impl KinematicParams {
    pub fn new(la: f64, lb: f64) -> Result<Self, ParamsError> {
        let params = Self { la, lb };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.la.is_finite() {
            return Err(ParamsError::NonFinite { name: "la" });
        }
        if !self.lb.is_finite() {
            return Err(ParamsError::NonFinite { name: "lb" });
        }
        if self.la < 0.0 {
            return Err(ParamsError::NegativeLa(self.la));
        }
        if self.lb <= 0.0 {
            return Err(ParamsError::NonPositiveLb(self.lb));
        }
        Ok(())
    }

    pub fn is_unusually_large(&self) -> bool {
        self.la > LARGE_LINK_LENGTH || self.lb > LARGE_LINK_LENGTH
    }
}

/// Which formula and Z baseline a calibration step is evaluated with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KinematicsMode {
    /// Compound model, Z relative to the captured reference.
    Camera,
    /// Compound model, Z relative to the bed surface (Z = 0).
    BedProbe,
    /// Compound model, Z relative to a height captured by the operator.
    ManualProbe { reference_z: f64 },
    /// Each axis evaluated on its own at the tip.
    Cone,
}

#[derive(Debug, Error, PartialEq)]
pub enum ComputationError {
    #[error("invalid kinematic parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("angle is not a finite number")]
    NonFiniteAngle,

    #[error("angle {0} is outside +/-360 degrees")]
    AngleOutOfRange(f64),

    #[error("reference position is not finite")]
    NonFiniteReference,

    #[error("model produced a non-finite position for {axis}{angle}")]
    NonFiniteResult { axis: Axis, angle: f64 },
}

/// Where the nozzle tip should be with `axis` rotated to `angle` degrees and
/// the other rotary axis held at zero.
pub fn expected_position(
    angle: f64,
    axis: Axis,
    reference: &Position,
    params: &KinematicParams,
    mode: KinematicsMode,
) -> Result<Position, ComputationError> {
    params.validate()?;
    if !angle.is_finite() {
        return Err(ComputationError::NonFiniteAngle);
    }
    if angle.abs() > MAX_ANGLE {
        return Err(ComputationError::AngleOutOfRange(angle));
    }
    if !reference.is_finite() {
        return Err(ComputationError::NonFiniteReference);
    }

    let (a, b) = match axis {
        Axis::A => (angle, 0.0),
        Axis::B => (0.0, angle),
    };

    let position = match mode {
        KinematicsMode::Camera => compound::forward(reference, reference.z, a, b, params),
        KinematicsMode::BedProbe => compound::forward(reference, 0.0, a, b, params),
        KinematicsMode::ManualProbe { reference_z } => {
            compound::forward(reference, reference_z, a, b, params)
        }
        KinematicsMode::Cone => cone::forward(reference, axis, angle, params),
    };

    if !position.is_finite() {
        return Err(ComputationError::NonFiniteResult { axis, angle });
    }
    Ok(position)
}

/// Position that, once corrected for the head at (`a`, `b`), lands on
/// `position`. Inverse of the compound model.
pub fn reverse_kinematics(position: &Position, a: f64, b: f64, params: &KinematicParams) -> Position {
    compound::inverse(position, a, b, params)
}
