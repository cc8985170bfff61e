//! Camera model: intrinsics, extrinsic pose, and the derived projection
//! matrix.
//!
//! Distortion coefficients are carried alongside the intrinsic matrix for
//! completeness of the per-session record, but no code in this workspace
//! applies them: points are undistorted upstream, so projection here is the
//! plain pinhole model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{Mat3, Mat3x4, Pt2, Pt3, Real, Vec3};

/// Tolerance for the orthonormality check on rotation updates.
const ORTHONORMALITY_EPS: Real = 1e-6;

/// Errors from camera pose updates.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The supplied rotation is not orthonormal with determinant +1.
    #[error("rotation is not orthonormal (det = {det})")]
    NotOrthonormal { det: Real },
    /// Camera-count mismatch between poses and intrinsics.
    #[error("expected {expected} poses, got {got}")]
    PoseCountMismatch { expected: usize, got: usize },
}

/// Extrinsic pose of one camera: rotation and translation mapping world
/// coordinates into the camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPose {
    pub r: Mat3,
    pub t: Vec3,
}

impl CameraPose {
    /// Identity pose (the gauge reference for camera 0).
    pub fn identity() -> Self {
        Self {
            r: Mat3::identity(),
            t: Vec3::zeros(),
        }
    }

    pub fn new(r: Mat3, t: Vec3) -> Self {
        Self { r, t }
    }

    /// Check that the rotation block is orthonormal with determinant +1.
    ///
    /// A failing check indicates a bad pose update, not a recoverable
    /// numerical wobble.
    pub fn is_orthonormal(&self) -> bool {
        let rtr = self.r.transpose() * self.r;
        let ortho = (rtr - Mat3::identity()).norm() < ORTHONORMALITY_EPS;
        ortho && (self.r.determinant() - 1.0).abs() < ORTHONORMALITY_EPS
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Intrinsically calibrated camera with a mutable pose.
///
/// The projection matrix `P = K·[R|t]` is cached and recomputed on every
/// pose update, never on the per-frame read path.
#[derive(Debug, Clone)]
pub struct Camera {
    intrinsics: Mat3,
    distortion: Vec<Real>,
    pose: CameraPose,
    projection: Mat3x4,
}

impl Camera {
    pub fn new(intrinsics: Mat3, distortion: Vec<Real>) -> Self {
        let pose = CameraPose::identity();
        let projection = projection_matrix(&intrinsics, &pose);
        Self {
            intrinsics,
            distortion,
            pose,
            projection,
        }
    }

    pub fn intrinsics(&self) -> &Mat3 {
        &self.intrinsics
    }

    pub fn distortion(&self) -> &[Real] {
        &self.distortion
    }

    pub fn pose(&self) -> &CameraPose {
        &self.pose
    }

    pub fn projection(&self) -> &Mat3x4 {
        &self.projection
    }

    /// Replace the pose, rejecting non-orthonormal rotations.
    pub fn set_pose(&mut self, pose: CameraPose) -> Result<(), CameraError> {
        if !pose.is_orthonormal() {
            return Err(CameraError::NotOrthonormal {
                det: pose.r.determinant(),
            });
        }
        self.projection = projection_matrix(&self.intrinsics, &pose);
        self.pose = pose;
        Ok(())
    }
}

/// Build `P = K·[R|t]` for one camera.
pub fn projection_matrix(intrinsics: &Mat3, pose: &CameraPose) -> Mat3x4 {
    let mut rt = Mat3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&pose.r);
    rt.fixed_view_mut::<3, 1>(0, 3).copy_from(&pose.t);
    intrinsics * rt
}

/// Build projection matrices for an aligned set of cameras.
pub fn projection_matrices(
    intrinsics: &[Mat3],
    poses: &[CameraPose],
) -> Result<Vec<Mat3x4>, CameraError> {
    if intrinsics.len() != poses.len() {
        return Err(CameraError::PoseCountMismatch {
            expected: intrinsics.len(),
            got: poses.len(),
        });
    }
    Ok(intrinsics
        .iter()
        .zip(poses)
        .map(|(k, pose)| projection_matrix(k, pose))
        .collect())
}

/// Pinhole projection of a world point into pixel coordinates.
///
/// Returns `None` when the point lies on the camera's principal plane
/// (homogeneous weight ≈ 0), which would otherwise produce non-finite
/// pixels.
pub fn project_point(intrinsics: &Mat3, pose: &CameraPose, point: &Pt3) -> Option<Pt2> {
    let cam = intrinsics * (pose.r * point.coords + pose.t);
    if cam.z.abs() < Real::EPSILON {
        return None;
    }
    Some(Pt2::new(cam.x / cam.z, cam.y / cam.z))
}

/// Serializable per-camera configuration: the immutable part of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// 3×3 intrinsic matrix, row-major.
    pub matrix: [[Real; 3]; 3],
    /// Lens distortion coefficients (informational; applied upstream).
    #[serde(default)]
    pub distortion: Vec<Real>,
}

impl CameraIntrinsics {
    pub fn to_matrix(&self) -> Mat3 {
        Mat3::from_fn(|r, c| self.matrix[r][c])
    }

    pub fn from_matrix(m: &Mat3) -> Self {
        Self {
            matrix: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
            distortion: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn test_intrinsics() -> Mat3 {
        Mat3::new(320.0, 0.0, 160.0, 0.0, 320.0, 160.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn identity_pose_projects_through_intrinsics() {
        let k = test_intrinsics();
        let pose = CameraPose::identity();
        let px = project_point(&k, &pose, &Pt3::new(0.0, 0.0, 1.0)).unwrap();
        assert_relative_eq!(px, Pt2::new(160.0, 160.0), epsilon = 1e-12);
    }

    #[test]
    fn set_pose_rejects_sheared_rotation() {
        let mut cam = Camera::new(test_intrinsics(), vec![]);
        let mut bad = Mat3::identity();
        bad[(0, 1)] = 0.3;
        let err = cam.set_pose(CameraPose::new(bad, Vec3::zeros()));
        assert!(err.is_err());
        // pose unchanged after the rejected update
        assert_eq!(cam.pose().r, Mat3::identity());
    }

    #[test]
    fn set_pose_recomputes_projection() {
        let k = test_intrinsics();
        let mut cam = Camera::new(k, vec![]);
        let r = *Rotation3::from_euler_angles(0.0, 0.1, -0.2).matrix();
        let t = Vec3::new(0.5, -0.1, 0.2);
        cam.set_pose(CameraPose::new(r, t)).unwrap();
        let expected = projection_matrix(&k, cam.pose());
        assert_relative_eq!(*cam.projection(), expected, epsilon = 1e-12);
    }

    #[test]
    fn projection_matrices_require_aligned_lengths() {
        let ks = vec![test_intrinsics(); 2];
        let poses = vec![CameraPose::identity()];
        assert!(projection_matrices(&ks, &poses).is_err());
    }

    #[test]
    fn point_behind_principal_plane_is_rejected() {
        let k = test_intrinsics();
        let pose = CameraPose::identity();
        assert!(project_point(&k, &pose, &Pt3::new(0.3, 0.1, 0.0)).is_none());
    }

    #[test]
    fn intrinsics_roundtrip_through_serializable_form() {
        let k = test_intrinsics();
        let data = CameraIntrinsics::from_matrix(&k);
        assert_relative_eq!(data.to_matrix(), k, epsilon = 1e-15);
    }
}
