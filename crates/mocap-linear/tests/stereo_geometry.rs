//! Integration test: the full linear path on a synthetic stereo rig.
//! Pose chain from wand observations, triangulation under the estimated
//! chain, then world-frame calibration on the reconstructed cloud.

use nalgebra::Rotation3;

use mocap_core::{project_point, projection_matrices, CalibrationSample, CameraPose, Mat3, Pt3,
    Real, Vec3};
use mocap_linear::pose_chain::{estimate_pose_chain, wand_ransac_options};
use mocap_linear::triangulation::{reprojection_errors, triangulate_points};
use mocap_linear::{fix_scale, WorldTransform};

fn intrinsics() -> Mat3 {
    Mat3::new(320.0, 0.0, 160.0, 0.0, 320.0, 160.0, 0.0, 0.0, 1.0)
}

fn truth_rig() -> (Vec<Mat3>, Vec<CameraPose>) {
    let ks = vec![intrinsics(); 2];
    let poses = vec![
        CameraPose::identity(),
        CameraPose::new(
            *Rotation3::from_euler_angles(0.06, -0.22, 0.03).matrix(),
            Vec3::new(-0.65, 0.06, 0.12),
        ),
    ];
    (ks, poses)
}

fn observe(ks: &[Mat3], poses: &[CameraPose], cloud: &[Pt3]) -> Vec<CalibrationSample> {
    cloud
        .iter()
        .map(|p| {
            ks.iter()
                .zip(poses)
                .map(|(k, pose)| project_point(k, pose, p))
                .collect()
        })
        .collect()
}

fn wand_cloud() -> Vec<Pt3> {
    (0..48)
        .map(|i| {
            let x = ((i * 37 % 23) as Real / 23.0 - 0.5) * 1.3;
            let y = ((i * 13 % 17) as Real / 17.0 - 0.5) * 0.9;
            let z = 1.2 + (i * 5 % 11) as Real * 0.11;
            Pt3::new(x, y, z)
        })
        .collect()
}

#[test]
fn estimated_chain_reconstructs_the_wand_cloud() {
    let (ks, truth) = truth_rig();
    let cloud = wand_cloud();
    let samples = observe(&ks, &truth, &cloud);

    let chain = estimate_pose_chain(&samples, &ks, &wand_ransac_options()).unwrap();
    let projections = projection_matrices(&ks, &chain).unwrap();
    let points = triangulate_points(&samples, &projections);

    // Every wand point reconstructs, and reprojects tightly under the
    // estimated chain (the absolute positions differ from ground truth by
    // the unknown global scale).
    assert!(points.iter().all(Option::is_some));
    let errors = reprojection_errors(&samples, &points, &ks, &chain);
    assert_eq!(errors.len(), cloud.len());
    let mean = errors.iter().sum::<Real>() / errors.len() as Real;
    assert!(mean < 1e-4, "mean reprojection error {mean}");
}

#[test]
fn world_calibration_flattens_and_scales_a_reconstruction() {
    let (ks, truth) = truth_rig();

    // A floor: planar cloud in the reconstruction frame.
    let tilt = Rotation3::from_euler_angles(0.1, -0.06, 0.0);
    let floor: Vec<Pt3> = (0..24)
        .map(|i| {
            let x = (i % 6) as Real * 0.25 - 0.6;
            let y = (i / 6) as Real * 0.25 - 0.4;
            tilt * Pt3::new(x, y, 1.1)
        })
        .collect();

    let mut world = WorldTransform::default();
    let residual = world.align_floor(&floor).unwrap();
    assert!(residual < 1e-9, "floor residual {residual}");

    // Origin: pick a reconstructed floor point, designate its published
    // world-frame position as the origin, and check the full per-frame
    // mapping now sends it to zero.
    let anchor_world = world.apply(&floor[0]);
    world.set_origin(&anchor_world);
    assert!(world.apply(&floor[0]).coords.norm() < 1e-9);

    // Scale: marker pair observed at twice the known spacing halves every
    // translation.
    let mut poses = truth.clone();
    let known = 0.119;
    let observed = vec![vec![Pt3::origin(), Pt3::new(2.0 * known, 0.0, 0.0)]];
    let scale = fix_scale(&mut poses, &observed, known).unwrap();
    assert!((scale - 0.5).abs() < 1e-12);
    assert!((poses[1].t - truth[1].t * 0.5).norm() < 1e-12);
}
