//! Direct-linear-transform triangulation and reprojection errors.
//!
//! Each valid view contributes two linear equations derived from the cross
//! product of the homogeneous image point with its projection matrix rows.
//! The stacked system is solved through the SVD of `AᵀA`; no iterative
//! refinement happens here.

use nalgebra::DMatrix;

use mocap_core::{
    project_point, CalibrationSample, CameraPose, Mat3, Mat3x4, Mat4, Pt2, Pt3, Real,
};

/// Triangulate one aligned observation row against its projection matrices.
///
/// Absent observations are dropped together with their cameras; fewer than
/// two surviving views, or a numerically degenerate system, yields `None`.
pub fn triangulate_point(sample: &CalibrationSample, projections: &[Mat3x4]) -> Option<Pt3> {
    let views: Vec<(usize, &Pt2)> = sample
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
        .collect();
    if views.len() < 2 {
        return None;
    }

    let mut a = DMatrix::<Real>::zeros(2 * views.len(), 4);
    for (row, (cam, point)) in views.iter().enumerate() {
        let p = &projections[*cam];
        for col in 0..4 {
            a[(2 * row, col)] = point.y * p[(2, col)] - p[(1, col)];
            a[(2 * row + 1, col)] = p[(0, col)] - point.x * p[(2, col)];
        }
    }

    let b: Mat4 = Mat4::from_iterator((a.transpose() * &a).iter().copied());
    let svd = b.svd(true, true);
    let v_t = svd.v_t?;

    // Smallest singular value lives in the last row of Vᵀ.
    let h = v_t.fixed_rows::<1>(3).transpose();
    let w = h[3];
    if w.abs() < 1e-12 {
        return None;
    }
    let point = Pt3::new(h[0] / w, h[1] / w, h[2] / w);
    if point.coords.iter().all(|c| c.is_finite()) {
        Some(point)
    } else {
        None
    }
}

/// Batch [`triangulate_point`] over aligned rows. Output order follows the
/// input; undefined points stay in place as `None`.
pub fn triangulate_points(
    samples: &[CalibrationSample],
    projections: &[Mat3x4],
) -> Vec<Option<Pt3>> {
    samples
        .iter()
        .map(|sample| triangulate_point(sample, projections))
        .collect()
}

/// Mean of squared per-axis pixel residuals of one reconstructed point over
/// its contributing views. `None` with fewer than two valid views.
///
/// Projection is pure pinhole: undistortion already happened upstream.
pub fn reprojection_error(
    sample: &CalibrationSample,
    point: &Pt3,
    intrinsics: &[Mat3],
    poses: &[CameraPose],
) -> Option<Real> {
    let mut sum = 0.0;
    let mut terms = 0usize;
    let mut views = 0usize;
    for (cam, observed) in sample.iter().enumerate() {
        let Some(observed) = observed else { continue };
        let Some(projected) = project_point(&intrinsics[cam], &poses[cam], point) else {
            continue;
        };
        let dx = observed.x - projected.x;
        let dy = observed.y - projected.y;
        sum += dx * dx + dy * dy;
        terms += 2;
        views += 1;
    }
    if views < 2 {
        return None;
    }
    Some(sum / terms as Real)
}

/// Per-point reprojection errors for a batch, compacted: rows whose point
/// is undefined (or has too few views) are skipped, matching the order of
/// the surviving points.
pub fn reprojection_errors(
    samples: &[CalibrationSample],
    points: &[Option<Pt3>],
    intrinsics: &[Mat3],
    poses: &[CameraPose],
) -> Vec<Real> {
    samples
        .iter()
        .zip(points)
        .filter_map(|(sample, point)| {
            let point = point.as_ref()?;
            reprojection_error(sample, point, intrinsics, poses)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mocap_core::{projection_matrices, Pt2, Vec3};
    use nalgebra::Rotation3;

    fn intrinsics() -> Mat3 {
        Mat3::new(320.0, 0.0, 160.0, 0.0, 320.0, 160.0, 0.0, 0.0, 1.0)
    }

    fn stereo_rig() -> (Vec<Mat3>, Vec<CameraPose>) {
        let ks = vec![intrinsics(), intrinsics()];
        let poses = vec![
            CameraPose::identity(),
            CameraPose::new(
                *Rotation3::from_euler_angles(0.0, -0.1, 0.0).matrix(),
                Vec3::new(-0.3, 0.0, 0.05),
            ),
        ];
        (ks, poses)
    }

    fn observe(ks: &[Mat3], poses: &[CameraPose], point: &Pt3) -> CalibrationSample {
        ks.iter()
            .zip(poses)
            .map(|(k, pose)| project_point(k, pose, point))
            .collect()
    }

    #[test]
    fn noiseless_stereo_recovers_ground_truth() {
        let (ks, poses) = stereo_rig();
        let projections = projection_matrices(&ks, &poses).unwrap();
        let truth = Pt3::new(0.12, -0.05, 1.4);

        let sample = observe(&ks, &poses, &truth);
        let point = triangulate_point(&sample, &projections).expect("triangulated");
        assert_relative_eq!(point, truth, epsilon = 1e-8);

        let err = reprojection_error(&sample, &point, &ks, &poses).unwrap();
        assert!(err < 1e-12, "reprojection error {err}");
    }

    #[test]
    fn fewer_than_two_views_is_undefined() {
        let (ks, poses) = stereo_rig();
        let projections = projection_matrices(&ks, &poses).unwrap();

        let lone: CalibrationSample = vec![Some(Pt2::new(100.0, 100.0)), None];
        assert!(triangulate_point(&lone, &projections).is_none());

        let empty: CalibrationSample = vec![None, None];
        assert!(triangulate_point(&empty, &projections).is_none());
    }

    #[test]
    fn occluded_camera_is_skipped_not_fatal() {
        let ks = vec![intrinsics(); 3];
        let poses = vec![
            CameraPose::identity(),
            CameraPose::new(
                *Rotation3::from_euler_angles(0.0, 0.15, 0.0).matrix(),
                Vec3::new(-0.4, 0.0, 0.0),
            ),
            CameraPose::new(
                *Rotation3::from_euler_angles(0.1, -0.2, 0.0).matrix(),
                Vec3::new(0.3, -0.1, 0.1),
            ),
        ];
        let projections = projection_matrices(&ks, &poses).unwrap();
        let truth = Pt3::new(-0.06, 0.02, 1.1);

        let mut sample = observe(&ks, &poses, &truth);
        sample[1] = None;

        let point = triangulate_point(&sample, &projections).expect("two views remain");
        assert_relative_eq!(point, truth, epsilon = 1e-7);
    }

    #[test]
    fn batch_keeps_row_alignment() {
        let (ks, poses) = stereo_rig();
        let projections = projection_matrices(&ks, &poses).unwrap();
        let truth = Pt3::new(0.0, 0.1, 1.2);

        let samples = vec![
            observe(&ks, &poses, &truth),
            vec![None, Some(Pt2::new(10.0, 10.0))],
        ];
        let points = triangulate_points(&samples, &projections);
        assert!(points[0].is_some());
        assert!(points[1].is_none());

        let errors = reprojection_errors(&samples, &points, &ks, &poses);
        assert_eq!(errors.len(), 1);
    }
}
