//! Mathematical type definitions and small helpers.
//!
//! These aliases fix the scalar type for the whole workspace and keep
//! signatures short in the geometry-heavy crates.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector2, Vector3};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 3×4 matrix with [`Real`] entries (projection matrices).
pub type Mat3x4 = Matrix3x4<Real>;
/// 4×4 matrix with [`Real`] entries (homogeneous transforms).
pub type Mat4 = Matrix4<Real>;

/// Convert a 2D point into homogeneous coordinates `(x, y, 1)`.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Skew-symmetric cross-product matrix of `v`.
///
/// Satisfies `skew(v) * w == v.cross(&w)` for any `w`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}
