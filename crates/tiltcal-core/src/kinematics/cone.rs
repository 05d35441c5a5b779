// Cone probe model: each axis swings the tip on its own circle

use crate::kinematics::KinematicParams;
use crate::position::{Axis, Position};

pub fn forward(reference: &Position, axis: Axis, angle: f64, params: &KinematicParams) -> Position {
    let (sin, cos) = angle.to_radians().sin_cos();
    match axis {
        Axis::A => Position {
            x: reference.x + params.la * sin,
            z: reference.z + params.la * (1.0 - cos),
            a: angle,
            b: 0.0,
            ..*reference
        },
        Axis::B => Position {
            y: reference.y + params.lb * sin,
            z: reference.z + params.lb * (1.0 - cos),
            a: 0.0,
            b: angle,
            ..*reference
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_half_turn_lifts_twice_la() {
        let reference = Position::new(100.0, 100.0, 10.0, 0.0, 0.0);
        let params = KinematicParams { la: 8.0, lb: 30.0 };
        let got = forward(&reference, Axis::A, 180.0, &params);
        assert!((got.x - 100.0).abs() < 1e-9);
        assert!((got.z - 26.0).abs() < 1e-9);
        assert_eq!(got.y, 100.0);
    }

    #[test]
    fn b_moves_along_y() {
        let reference = Position::new(100.0, 100.0, 10.0, 0.0, 0.0);
        let params = KinematicParams { la: 8.0, lb: 30.0 };
        let got = forward(&reference, Axis::B, -90.0, &params);
        assert!((got.y - 70.0).abs() < 1e-9);
        assert!((got.z - 40.0).abs() < 1e-9);
        assert_eq!(got.x, 100.0);
    }
}
