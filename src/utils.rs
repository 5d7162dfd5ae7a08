use crate::types::{Axis, Position, Quaternion, Transform};
use cgmath::{Deg, InnerSpace, Matrix4, Rotation3, Zero};

/// Identity quaternion (cgmath stores the scalar part first).
pub(crate) fn identity_rotation() -> Quaternion {
    Quaternion::new(1.0, 0.0, 0.0, 0.0)
}

pub(crate) fn identity_transform() -> Transform {
    Transform {
        scale: 1.0,
        rot: identity_rotation(),
        disp: Position::zero(),
    }
}

/// `parent * child`, i.e. express `child` (given in the parent's space) in the parent's parent space.
pub(crate) fn compose(parent: &Transform, child: &Transform) -> Transform {
    Transform {
        scale: parent.scale * child.scale,
        rot: normalize_rotation(parent.rot * child.rot),
        disp: parent.disp + parent.rot * (child.disp * parent.scale),
    }
}

/// Inverse of a decomposed transform. A zero scale is treated as 1 so the result stays finite.
pub(crate) fn invert(t: &Transform) -> Transform {
    let scale = if t.scale.abs() > f64::EPSILON { 1.0 / t.scale } else { 1.0 };
    let rot = t.rot.conjugate();
    Transform {
        scale,
        rot,
        disp: rot * (-t.disp * scale),
    }
}

pub(crate) fn to_matrix(t: &Transform) -> Matrix4<f64> {
    Matrix4::from_translation(t.disp) * Matrix4::from(t.rot) * Matrix4::from_scale(t.scale)
}

/// Renormalize a rotation, falling back to identity for degenerate (zero length or NaN) input.
pub(crate) fn normalize_rotation(q: Quaternion) -> Quaternion {
    let m = q.magnitude();
    if m.is_finite() && m > f64::EPSILON {
        q / m
    } else {
        identity_rotation()
    }
}

/// Rotation `r` such that `from * r == to`.
pub(crate) fn rotation_offset(from: Quaternion, to: Quaternion) -> Quaternion {
    normalize_rotation(from.conjugate() * to)
}

/// Convert euler angles in DEGREES to a quaternion.
/// Angles are applied in the order they are given (intrinsic rotations), which is how .bvh channels are authored.
pub(crate) fn from_euler_degrees(angles: &[(Axis, f64)]) -> Quaternion {
    let q = angles
        .iter()
        .fold(identity_rotation(), |acc, &(axis, angle)| {
            let r = match axis {
                Axis::X => Quaternion::from_angle_x(Deg(angle)),
                Axis::Y => Quaternion::from_angle_y(Deg(angle)),
                Axis::Z => Quaternion::from_angle_z(Deg(angle)),
            };
            acc * r
        });
    normalize_rotation(q)
}

/// True when two rotations describe the same orientation (q and -q are equal rotations).
pub fn same_rotation(a: Quaternion, b: Quaternion, epsilon: f64) -> bool {
    a.dot(b).abs() > 1.0 - epsilon
}
