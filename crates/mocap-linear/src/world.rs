//! World-frame calibration: floor alignment, origin fixing and scale
//! fixing.
//!
//! The reconstruction frame and the world frame differ by a fixed axis
//! convention inherited from the capture system (X/Y mirror on entry, Y/Z
//! swap on exit). That convention is preserved here exactly as observed;
//! see DESIGN.md before touching any sign below.

use nalgebra::DMatrix;
use thiserror::Error;

use mocap_core::{skew, CameraPose, Mat3, Mat4, Pt3, Real, Vec3, WorldTransformData};

/// Errors from world-frame calibration.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("floor fit needs at least 3 points, got {0}")]
    TooFewFloorPoints(usize),
    #[error("floor point cloud is degenerate")]
    DegenerateFloor,
    #[error("no frame contained exactly one marker pair")]
    NoScalePairs,
    #[error("observed marker separations are degenerate")]
    DegenerateScale,
}

/// Homogeneous transform mapping reconstruction coordinates to world
/// coordinates. Mutated only by the calibration operations below; the
/// per-frame path reads it through [`WorldTransform::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorldTransform(Mat4);

impl Default for WorldTransform {
    fn default() -> Self {
        Self(Mat4::identity())
    }
}

impl WorldTransform {
    pub fn new(matrix: Mat4) -> Self {
        Self(matrix)
    }

    pub fn matrix(&self) -> &Mat4 {
        &self.0
    }

    pub fn to_data(&self) -> WorldTransformData {
        WorldTransformData::from_matrix(&self.0)
    }

    pub fn from_data(data: &WorldTransformData) -> Self {
        Self(data.to_matrix())
    }

    /// Map one reconstructed point into world coordinates.
    ///
    /// Applies the legacy convention: mirror X and Y, transform,
    /// dehomogenize, then swap Y and Z.
    pub fn apply(&self, point: &Pt3) -> Pt3 {
        let mirrored = Vec3::new(-point.x, -point.y, point.z);
        let h = self.0 * mirrored.push(1.0);
        let w = h[3];
        Pt3::new(h[0] / w, h[2] / w, h[1] / w)
    }

    /// Align the transform so a floor point cloud maps onto world Z = 0.
    ///
    /// Fits the best plane through `points`, rotates its normal onto world
    /// +Z via the Rodrigues cross-product formula, and keeps whichever
    /// rotation sense actually flattens the cloud. Returns the remaining
    /// flatness residual (max |z − mean z|) of the transformed cloud.
    pub fn align_floor(&mut self, points: &[Pt3]) -> Result<Real, WorldError> {
        if points.len() < 3 {
            return Err(WorldError::TooFewFloorPoints(points.len()));
        }

        let n = points.len() as Real;
        let centroid = points
            .iter()
            .fold(Vec3::zeros(), |acc, p| acc + p.coords)
            / n;

        let mut centered = DMatrix::<Real>::zeros(points.len(), 3);
        for (i, p) in points.iter().enumerate() {
            let d = p.coords - centroid;
            centered[(i, 0)] = d.x;
            centered[(i, 1)] = d.y;
            centered[(i, 2)] = d.z;
        }

        let svd = centered.svd(false, true);
        let v_t = svd.v_t.ok_or(WorldError::DegenerateFloor)?;
        let mut normal = Vec3::new(v_t[(2, 0)], v_t[(2, 1)], v_t[(2, 2)]);
        if normal.z < 0.0 {
            normal = -normal;
        }

        let target = Vec3::z();
        let v = normal.cross(&target);
        let c = normal.dot(&target);
        // An antiparallel normal has no cross-product rotation onto +Z.
        if (1.0 + c).abs() < 1e-9 {
            return Err(WorldError::DegenerateFloor);
        }

        let kmat = skew(&v);
        let forward: Mat3 = Mat3::identity() + kmat + kmat * kmat * (1.0 / (1.0 + c));

        let existing = self.0;
        let existing_rot: Mat3 = existing.fixed_view::<3, 3>(0, 0).into();

        let mut candidate = existing;
        candidate
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(forward * existing_rot));

        // The rotated cloud must be flatter than it was under the
        // unrotated transform, otherwise the rotation sense is wrong.
        let baseline = planarity_residual(&existing, points);
        let mut residual = planarity_residual(&candidate, points);

        if residual > baseline {
            let reverse: Mat3 = Mat3::identity() - kmat + kmat * kmat * (1.0 / (1.0 - c));
            candidate
                .fixed_view_mut::<3, 3>(0, 0)
                .copy_from(&(reverse * existing_rot));
            residual = planarity_residual(&candidate, points);
        }

        // Drop the fitted plane onto world Z = 0.
        candidate[(2, 3)] = -target.dot(&centroid);

        self.0 = candidate;
        Ok(residual)
    }

    /// Translate the transform so the designated point maps to the world
    /// origin.
    ///
    /// `point` is a world-frame point as published by the per-frame path
    /// (i.e. after [`WorldTransform::apply`]). Its Y and Z are swapped
    /// before negation (the reconstruction frame's vertical is the world
    /// frame's depth) and the correction is left-composed onto the
    /// current transform.
    pub fn set_origin(&mut self, point: &Pt3) {
        let swapped = Vec3::new(point.x, point.z, point.y);
        let mut correction = Mat4::identity();
        correction
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&(-swapped));
        self.0 = correction * self.0;
    }
}

/// Height-invariant flatness of the cloud under a candidate transform:
/// max |z − mean z|. The check runs in the raw reconstruction frame, no
/// axis convention applied.
fn planarity_residual(matrix: &Mat4, points: &[Pt3]) -> Real {
    let zs: Vec<Real> = points
        .iter()
        .map(|p| {
            let h = matrix * p.coords.push(1.0);
            h[2] / h[3]
        })
        .collect();
    let mean = zs.iter().sum::<Real>() / zs.len() as Real;
    zs.iter().map(|z| (z - mean).abs()).fold(0.0, Real::max)
}

/// Rescale every camera translation so the mean observed marker separation
/// equals `known_distance`. Returns the applied scale factor.
///
/// `observations` holds per-frame point sets; only frames with exactly two
/// points contribute. Rotations are scale-invariant and untouched.
pub fn fix_scale(
    poses: &mut [CameraPose],
    observations: &[Vec<Pt3>],
    known_distance: Real,
) -> Result<Real, WorldError> {
    let mut distances = Vec::new();
    for frame in observations {
        if let [a, b] = frame.as_slice() {
            distances.push((a - b).norm());
        }
    }
    if distances.is_empty() {
        return Err(WorldError::NoScalePairs);
    }
    let mean = distances.iter().sum::<Real>() / distances.len() as Real;
    if mean < 1e-12 {
        return Err(WorldError::DegenerateScale);
    }

    let scale = known_distance / mean;
    for pose in poses.iter_mut() {
        pose.t *= scale;
    }
    Ok(scale)
}
