//! Cross-camera point correspondence under epipolar constraints.
//!
//! Every dot seen by camera 0 roots a hypothesis family. Walking the
//! remaining cameras in index order, each family gates camera `i`'s
//! unclaimed dots against the epipolar line of its root point; ambiguous
//! matches fork the family's groups instead of committing to the nearest
//! candidate, and dots no line claims become new roots (features that were
//! occluded early and reappear later). Once all cameras are processed,
//! every group is triangulated and each family keeps its lowest-error
//! group.
//!
//! Output order follows root discovery order and is NOT stable across
//! frames; identity is re-derived downstream by the tracker.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use mocap_core::{
    projection_matrices, CalibrationSample, CameraPose, FramePoints, Mat3, ObjectPoint, Real,
};
use mocap_linear::epipolar::{epipolar_line, fundamental_from_projections, line_point_distance};
use mocap_linear::triangulation::{reprojection_error, triangulate_point};

/// Epipolar gating options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Maximum perpendicular distance (px) from a candidate dot to the
    /// epipolar line of a hypothesis root.
    pub max_line_distance: Real,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_line_distance: 5.0,
        }
    }
}

/// Index of one detected dot: `frame.cameras[camera][index]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PointRef {
    camera: usize,
    index: usize,
}

/// One candidate correspondence: an `Option<PointRef>` per camera, aligned
/// by camera index. Absent entries keep later triangulation aligned.
#[derive(Debug, Clone)]
struct HypothesisGroup {
    entries: Vec<Option<PointRef>>,
}

/// All forked groups sharing one root point.
#[derive(Debug)]
struct HypothesisFamily {
    root: PointRef,
    groups: Vec<HypothesisGroup>,
}

impl HypothesisFamily {
    fn rooted_at(root: PointRef, num_cameras: usize) -> Self {
        let mut entries = vec![None; num_cameras];
        entries[root.camera] = Some(root);
        Self {
            root,
            groups: vec![HypothesisGroup { entries }],
        }
    }
}

/// Find cross-camera correspondences in one frame and triangulate them.
///
/// Returns reconstructed points with their reprojection errors, in root
/// discovery order. Families where no group reaches two views are dropped;
/// a frame-level failure does not exist; the result is simply shorter.
pub fn find_correspondences(
    frame: &FramePoints,
    intrinsics: &[Mat3],
    poses: &[CameraPose],
    opts: &MatchOptions,
) -> Vec<ObjectPoint> {
    let num_cameras = frame.num_cameras();
    if num_cameras < 2 || num_cameras != intrinsics.len() || num_cameras != poses.len() {
        return Vec::new();
    }
    let Ok(projections) = projection_matrices(intrinsics, poses) else {
        return Vec::new();
    };

    let mut families: Vec<HypothesisFamily> = frame.cameras[0]
        .iter()
        .enumerate()
        .map(|(index, _)| HypothesisFamily::rooted_at(PointRef { camera: 0, index }, num_cameras))
        .collect();

    for cam in 1..num_cameras {
        let dots = &frame.cameras[cam];
        let mut claimed: HashSet<usize> = HashSet::new();

        // Families rooted at this camera or later don't gate yet.
        let open_families = families
            .iter_mut()
            .filter(|f| f.root.camera < cam)
            .collect::<Vec<_>>();

        for family in open_families {
            let f = fundamental_from_projections(&projections[family.root.camera], &projections[cam]);
            let root_point = &frame.cameras[family.root.camera][family.root.index];
            let line = epipolar_line(&f, root_point);

            let mut candidates: Vec<(usize, Real)> = dots
                .iter()
                .enumerate()
                .map(|(i, p)| (i, line_point_distance(&line, p)))
                .filter(|(_, d)| *d < opts.max_line_distance)
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

            if candidates.is_empty() {
                // Preserve per-camera alignment: every open group records
                // an absent observation for this camera.
                continue;
            }

            // The single nearest match is spoken for; it cannot root a new
            // hypothesis at this camera.
            claimed.insert(candidates[0].0);

            // Fork: one clone of the family per candidate. Ambiguity is
            // deferred to triangulation, not resolved greedily here.
            let base_groups = std::mem::take(&mut family.groups);
            for (index, _) in &candidates {
                let mut forked = base_groups.clone();
                for group in &mut forked {
                    group.entries[cam] = Some(PointRef { camera: cam, index: *index });
                }
                family.groups.extend(forked);
            }
        }

        // Unclaimed dots start fresh families, visible from this camera on.
        for index in 0..dots.len() {
            if !claimed.contains(&index) {
                families.push(HypothesisFamily::rooted_at(
                    PointRef { camera: cam, index },
                    num_cameras,
                ));
            }
        }
    }

    let mut objects = Vec::new();
    for family in &families {
        let mut best: Option<ObjectPoint> = None;
        for group in &family.groups {
            let sample: CalibrationSample = group
                .entries
                .iter()
                .copied()
                .map(|entry| entry.map(|r| frame.cameras[r.camera][r.index]))
                .collect();
            let Some(point) = triangulate_point(&sample, &projections) else {
                continue;
            };
            let Some(error) = reprojection_error(&sample, &point, intrinsics, poses) else {
                continue;
            };
            let is_better = best.as_ref().map(|b| error < b.error).unwrap_or(true);
            if is_better {
                best = Some(ObjectPoint::new(point, error));
            }
        }
        // Families with no triangulatable group are dropped entirely.
        if let Some(best) = best {
            objects.push(best);
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mocap_core::{project_point, Pt3, Vec3};
    use nalgebra::Rotation3;

    fn intrinsics() -> Mat3 {
        Mat3::new(320.0, 0.0, 160.0, 0.0, 320.0, 160.0, 0.0, 0.0, 1.0)
    }

    fn two_camera_rig() -> (Vec<Mat3>, Vec<CameraPose>) {
        let ks = vec![intrinsics(); 2];
        let poses = vec![
            CameraPose::identity(),
            CameraPose::new(
                *Rotation3::from_euler_angles(0.02, -0.12, 0.0).matrix(),
                Vec3::new(-0.5, 0.02, 0.1),
            ),
        ];
        (ks, poses)
    }

    fn three_camera_rig() -> (Vec<Mat3>, Vec<CameraPose>) {
        let (mut ks, mut poses) = two_camera_rig();
        ks.push(intrinsics());
        poses.push(CameraPose::new(
            *Rotation3::from_euler_angles(-0.03, 0.15, 0.01).matrix(),
            Vec3::new(0.45, -0.05, 0.12),
        ));
        (ks, poses)
    }

    fn frame_of(ks: &[Mat3], poses: &[CameraPose], points: &[Pt3]) -> FramePoints {
        let cameras = ks
            .iter()
            .zip(poses)
            .map(|(k, pose)| {
                points
                    .iter()
                    .filter_map(|p| project_point(k, pose, p))
                    .collect()
            })
            .collect();
        FramePoints::new(cameras)
    }

    #[test]
    fn single_shared_feature_yields_one_point() {
        let (ks, poses) = two_camera_rig();
        let truth = Pt3::new(0.1, -0.08, 1.3);
        let frame = frame_of(&ks, &poses, &[truth]);

        let objects = find_correspondences(&frame, &ks, &poses, &MatchOptions::default());
        assert_eq!(objects.len(), 1);
        assert_relative_eq!(objects[0].position, truth, epsilon = 1e-6);
        assert!(objects[0].error < 1e-10);
    }

    #[test]
    fn two_separate_features_yield_two_points() {
        let (ks, poses) = three_camera_rig();
        let a = Pt3::new(0.2, 0.1, 1.4);
        let b = Pt3::new(-0.25, -0.12, 1.7);
        let frame = frame_of(&ks, &poses, &[a, b]);

        let mut objects = find_correspondences(&frame, &ks, &poses, &MatchOptions::default());
        assert_eq!(objects.len(), 2);
        objects.sort_by(|p, q| p.position.x.total_cmp(&q.position.x));
        assert_relative_eq!(objects[0].position, b, epsilon = 1e-5);
        assert_relative_eq!(objects[1].position, a, epsilon = 1e-5);
    }

    #[test]
    fn occluded_feature_roots_at_the_camera_where_it_reappears() {
        let (ks, poses) = three_camera_rig();
        let visible = Pt3::new(0.05, 0.0, 1.2);
        let occluded = Pt3::new(-0.3, 0.2, 1.9);

        // Camera 0 misses the second feature entirely.
        let mut frame = frame_of(&ks, &poses, &[visible, occluded]);
        frame.cameras[0].truncate(1);

        let objects = find_correspondences(&frame, &ks, &poses, &MatchOptions::default());

        // The reappearing feature must triangulate from cameras 1 and 2,
        // not get folded into the visible feature's family.
        assert_eq!(objects.len(), 2);
        let found = objects
            .iter()
            .any(|o| (o.position - occluded).norm() < 1e-4 && o.error < 1e-6);
        assert!(found, "occluded feature was not re-rooted: {objects:?}");
    }

    #[test]
    fn far_off_point_is_not_matched_across_cameras() {
        let (ks, poses) = two_camera_rig();
        let truth = Pt3::new(0.1, -0.08, 1.3);
        let mut frame = frame_of(&ks, &poses, &[truth]);
        // Replace camera 1's dot with one far from the epipolar line.
        let stray = frame.cameras[1][0] + Vec3::new(40.0, 40.0, 0.0).xy();
        frame.cameras[1][0] = stray;

        let objects = find_correspondences(&frame, &ks, &poses, &MatchOptions::default());
        // One-view families cannot triangulate.
        assert!(objects.is_empty(), "unexpected match: {objects:?}");
    }

    #[test]
    fn mismatched_camera_count_returns_empty() {
        let (ks, poses) = two_camera_rig();
        let frame = FramePoints::new(vec![vec![]]);
        assert!(find_correspondences(&frame, &ks, &poses, &MatchOptions::default()).is_empty());
    }
}
