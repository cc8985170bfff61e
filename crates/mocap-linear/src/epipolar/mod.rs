//! Epipolar geometry: fundamental-matrix estimation and essential-matrix
//! decomposition.
//!
//! - Fundamental matrix `F` expects **pixel coordinates** in both images.
//! - Essential matrix `E` is obtained from `F` with both cameras'
//!   intrinsics; its decomposition yields the four canonical pose
//!   candidates that cheirality testing disambiguates.

use nalgebra::Matrix4;
use thiserror::Error;

use mocap_core::{to_homogeneous, Mat3, Mat3x4, Pt2, Real, Vec3};

mod decomposition;
mod fundamental;

pub use decomposition::{decompose_essential, essential_from_fundamental};
pub use fundamental::{fundamental_8point, fundamental_8point_ransac};

/// Errors from fundamental / essential matrix estimation.
#[derive(Debug, Error)]
pub enum EpipolarError {
    /// Not enough point correspondences were provided.
    #[error("need at least {needed} point correspondences, got {got}")]
    NotEnoughPoints { needed: usize, got: usize },
    /// Linear solve (SVD) failed.
    #[error("svd failed in epipolar estimation")]
    SvdFailed,
    /// RANSAC failed to find a consensus model.
    #[error("ransac found no consensus epipolar model")]
    RansacFailed,
}

/// Fundamental matrix between two cameras derived from their projection
/// matrices.
///
/// `F[i][j]` is the determinant of the 4×4 matrix stacking two rows of the
/// first projection with two rows of the second, the standard closed form
/// for calibrated rigs where both projections are known.
pub fn fundamental_from_projections(p1: &Mat3x4, p2: &Mat3x4) -> Mat3 {
    let row_pairs = |p: &Mat3x4, a: usize, b: usize| -> [[Real; 4]; 2] {
        [
            [p[(a, 0)], p[(a, 1)], p[(a, 2)], p[(a, 3)]],
            [p[(b, 0)], p[(b, 1)], p[(b, 2)], p[(b, 3)]],
        ]
    };
    // Cyclic row pairs (1,2), (2,0), (0,1) of each projection.
    let x = [
        row_pairs(p1, 1, 2),
        row_pairs(p1, 2, 0),
        row_pairs(p1, 0, 1),
    ];
    let y = [
        row_pairs(p2, 1, 2),
        row_pairs(p2, 2, 0),
        row_pairs(p2, 0, 1),
    ];

    Mat3::from_fn(|i, j| {
        let m = Matrix4::<Real>::from_fn(|r, c| {
            if r < 2 {
                x[j][r][c]
            } else {
                y[i][r - 2][c]
            }
        });
        m.determinant()
    })
}

/// Epipolar line in the second image corresponding to `point` in the first:
/// `l' = F·x` as `(a, b, c)` with `a·u + b·v + c = 0`.
pub fn epipolar_line(f: &Mat3, point: &Pt2) -> Vec3 {
    f * to_homogeneous(point)
}

/// Perpendicular pixel distance from `point` to the line `(a, b, c)`.
///
/// Infinite for a degenerate line (`a = b = 0`), which conservatively fails
/// any distance gate.
pub fn line_point_distance(line: &Vec3, point: &Pt2) -> Real {
    let norm = (line.x * line.x + line.y * line.y).sqrt();
    if norm < 1e-12 {
        return Real::INFINITY;
    }
    (line.x * point.x + line.y * point.y + line.z).abs() / norm
}
