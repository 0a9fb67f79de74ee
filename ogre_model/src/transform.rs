//! Transforms and the fixed axis conversions between the source and OGRE conventions.
//!
//! The source scene is Z-up with bones pointing along their local Y axis.
//! OGRE is Y-up with bones pointing along their local X axis.
use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat3, Mat4, Quat, Vec3};

/// A decomposed transform as scale -> rotation -> translation (TRS).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Blend towards `rhs` by `t` using spherical interpolation for rotation.
    pub fn lerp(self, rhs: Transform, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(rhs.translation, t),
            rotation: self.rotation.slerp(rhs.rotation, t),
            scale: self.scale.lerp(rhs.scale, t),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rotates Z-up model space to Y-up model space.
pub fn z_up_to_y_up() -> Mat4 {
    Mat4::from_rotation_x(-FRAC_PI_2)
}

/// Moves the bone forward direction from the local Y axis to the local X axis.
pub fn bone_axis_fix() -> Mat4 {
    Mat4::from_rotation_z(FRAC_PI_2) * Mat4::from_rotation_x(PI)
}

/// Basis for translating root bone locations into Y-up model space.
pub fn root_translation_basis() -> Mat3 {
    // Rows (1, 0, 0), (0, 0, 1), (0, -1, 0).
    Mat3::from_cols_array_2d(&[[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, -1.0, 0.0]]).transpose()
}

/// Basis for translating child bone locations into the parent's OGRE bone space.
pub fn child_translation_basis() -> Mat3 {
    // Rows (0, 1, 0), (0, 0, 1), (1, 0, 0).
    Mat3::from_cols_array_2d(&[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]]).transpose()
}

/// Convert a Z-up position or direction to OGRE's Y-up convention.
///
/// This is applied to every geometric vertex attribute and pose offset.
pub fn to_ogre_axes(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

/// The inverse of [to_ogre_axes] for reading OGRE data back into Z-up space.
pub fn from_ogre_axes(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.z, v.y)
}

/// Reorder a vector from source bone space (Y forward) to OGRE bone space (X forward).
pub fn to_ogre_bone_axes(v: Vec3) -> Vec3 {
    Vec3::new(v.y, v.z, v.x)
}

/// The rotation angle in radians and the normalized rotation axis of `q`.
///
/// Rotations without a well defined axis use the X axis.
pub fn angle_axis(q: Quat) -> (f32, Vec3) {
    let angle = 2.0 * q.w.clamp(-1.0, 1.0).acos();
    let v = Vec3::new(q.x, q.y, q.z);
    let length = v.length();
    let axis = if length == 0.0 { Vec3::X } else { v / length };
    (angle, axis)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::relative_eq;
    use glam::{quat, vec3};

    macro_rules! assert_vec3_relative_eq {
        ($a:expr, $b:expr) => {
            assert!(
                $a.to_array()
                    .iter()
                    .zip($b.to_array().iter())
                    .all(|(a, b)| relative_eq!(a, b, epsilon = 0.0001f32)),
                "Vectors not equal to within 0.0001.\nleft = {:?}\nright = {:?}",
                $a,
                $b
            )
        };
    }

    #[test]
    fn transform_lerp_halfway() {
        let a = Transform::IDENTITY;
        let b = Transform {
            translation: vec3(2.0, 4.0, 6.0),
            rotation: Quat::IDENTITY,
            scale: vec3(3.0, 3.0, 3.0),
        };
        let c = a.lerp(b, 0.5);
        assert_eq!(vec3(1.0, 2.0, 3.0), c.translation);
        assert_eq!(vec3(2.0, 2.0, 2.0), c.scale);
    }

    #[test]
    fn ogre_axes_forward() {
        assert_eq!(vec3(1.0, 3.0, -2.0), to_ogre_axes(vec3(1.0, 2.0, 3.0)));
    }

    #[test]
    fn ogre_axes_inverse() {
        let v = vec3(1.0, 2.0, 3.0);
        assert_eq!(vec3(1.0, -3.0, 2.0), from_ogre_axes(v));
        assert_eq!(v, from_ogre_axes(to_ogre_axes(v)));
        assert_eq!(v, to_ogre_axes(from_ogre_axes(v)));
    }

    #[test]
    fn ogre_axes_not_an_involution() {
        let v = vec3(1.0, 2.0, 3.0);
        assert_eq!(vec3(1.0, -2.0, -3.0), to_ogre_axes(to_ogre_axes(v)));
        assert_ne!(v, to_ogre_axes(to_ogre_axes(v)));
    }

    #[test]
    fn translation_bases_match_axis_permutations() {
        let v = vec3(1.0, 2.0, 3.0);
        assert_eq!(to_ogre_axes(v), root_translation_basis() * v);
        assert_eq!(to_ogre_bone_axes(v), child_translation_basis() * v);
    }

    #[test]
    fn bone_axis_fix_then_y_up() {
        let m = bone_axis_fix() * z_up_to_y_up();
        assert_vec3_relative_eq!(Vec3::Y, m.transform_vector3(Vec3::X));
        assert_vec3_relative_eq!(Vec3::Z, m.transform_vector3(Vec3::Y));
        assert_vec3_relative_eq!(Vec3::X, m.transform_vector3(Vec3::Z));
    }

    #[test]
    fn angle_axis_identity() {
        assert_eq!((0.0, Vec3::X), angle_axis(Quat::IDENTITY));
    }

    #[test]
    fn angle_axis_quarter_turn() {
        let (angle, axis) = angle_axis(Quat::from_rotation_y(FRAC_PI_2));
        assert!(relative_eq!(FRAC_PI_2, angle, epsilon = 0.0001));
        assert_vec3_relative_eq!(Vec3::Y, axis);
    }

    #[test]
    fn angle_axis_unnormalized_w() {
        // Slightly denormalized quaternions should not produce NaN.
        let (angle, axis) = angle_axis(quat(0.0, 0.0, 0.0, 1.0000001));
        assert_eq!(0.0, angle);
        assert_eq!(Vec3::X, axis);
    }
}
