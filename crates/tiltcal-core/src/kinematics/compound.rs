// Compound model: B rotates on the arm hung from A

use crate::kinematics::KinematicParams;
use crate::position::Position;

/// Tip position with both axes rotated. `z_base` replaces `reference.z` as
/// the height the B swing is measured from.
pub fn forward(reference: &Position, z_base: f64, a: f64, b: f64, params: &KinematicParams) -> Position {
    let (sin_a, cos_a) = a.to_radians().sin_cos();
    let (sin_b, cos_b) = b.to_radians().sin_cos();
    let KinematicParams { la, lb } = *params;

    Position {
        x: reference.x + sin_a * la + cos_a * sin_b * lb,
        y: reference.y - la + cos_a * la - sin_a * sin_b * lb,
        z: z_base + cos_b * lb - lb,
        a,
        b,
    }
}

pub fn inverse(position: &Position, a: f64, b: f64, params: &KinematicParams) -> Position {
    let (sin_a, cos_a) = a.to_radians().sin_cos();
    let (sin_b, cos_b) = b.to_radians().sin_cos();
    let KinematicParams { la, lb } = *params;

    Position {
        x: position.x - sin_a * la - cos_a * sin_b * lb,
        y: position.y + la - cos_a * la + sin_a * sin_b * lb,
        z: position.z - cos_b * lb + lb,
        a,
        b,
    }
}
