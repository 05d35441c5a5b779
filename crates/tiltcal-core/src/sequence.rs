// Fixed angle sweeps per calibration mode

use crate::position::Axis;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A axis in 30 degree steps over a full turn.
pub const CAMERA_A_ANGLES: [f64; 13] = [
    0.0, 30.0, 60.0, 90.0, 120.0, 150.0, 180.0, 210.0, 240.0, 270.0, 300.0, 330.0, 360.0,
];

/// B axis in 15 degree steps from -90 to 90.
pub const CAMERA_B_ANGLES: [f64; 13] = [
    -90.0, -75.0, -60.0, -45.0, -30.0, -15.0, 0.0, 15.0, 30.0, 45.0, 60.0, 75.0, 90.0,
];

pub const LINK_LENGTH_A_ANGLES: [f64; 4] = [0.0, 90.0, 180.0, 270.0];
pub const LINK_LENGTH_B_ANGLES: [f64; 3] = [-90.0, 0.0, 90.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalibrationMode {
    /// Camera-observed X/Y deviation.
    Xy,
    /// Bed probing for Z deviation.
    ZProbe,
    /// Cone tip alignment at the four/three link-length angles.
    Cone,
    /// Cone tip alignment over the camera sweeps.
    ConeFull,
}

impl CalibrationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "xy" | "camera" => Some(CalibrationMode::Xy),
            "z-probe" | "zprobe" | "z" => Some(CalibrationMode::ZProbe),
            "cone" => Some(CalibrationMode::Cone),
            "cone-full" => Some(CalibrationMode::ConeFull),
            _ => None,
        }
    }

    pub fn is_cone(self) -> bool {
        matches!(self, CalibrationMode::Cone | CalibrationMode::ConeFull)
    }

    /// Angle sequence swept for `axis`, in order.
    pub fn angles(self, axis: Axis) -> &'static [f64] {
        match (self, axis) {
            (CalibrationMode::Cone, Axis::A) => &LINK_LENGTH_A_ANGLES,
            (CalibrationMode::Cone, Axis::B) => &LINK_LENGTH_B_ANGLES,
            (_, Axis::A) => &CAMERA_A_ANGLES,
            (_, Axis::B) => &CAMERA_B_ANGLES,
        }
    }

    pub fn total_steps(self) -> usize {
        self.angles(Axis::A).len() + self.angles(Axis::B).len()
    }
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationMode::Xy => "xy",
            CalibrationMode::ZProbe => "z-probe",
            CalibrationMode::Cone => "cone",
            CalibrationMode::ConeFull => "cone-full",
        };
        f.write_str(name)
    }
}

/// The neutral angle of a sweep needs no measurement.
pub fn is_reference_angle(angle: f64) -> bool {
    angle == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_evenly_spaced() {
        for seq in [&CAMERA_A_ANGLES[..], &CAMERA_B_ANGLES[..]] {
            let step = seq[1] - seq[0];
            assert!(seq.windows(2).all(|w| w[1] - w[0] == step));
        }
        assert_eq!(CAMERA_A_ANGLES.last(), Some(&360.0));
        assert_eq!(CAMERA_B_ANGLES.first(), Some(&-90.0));
    }

    #[test]
    fn mode_selects_sequence() {
        assert_eq!(CalibrationMode::Cone.angles(Axis::B), &[-90.0, 0.0, 90.0]);
        assert_eq!(CalibrationMode::ConeFull.angles(Axis::A).len(), 13);
        assert_eq!(CalibrationMode::Cone.total_steps(), 7);
        assert_eq!(CalibrationMode::parse("Z-Probe"), Some(CalibrationMode::ZProbe));
        assert_eq!(CalibrationMode::ZProbe.to_string(), "z-probe");
    }
}
