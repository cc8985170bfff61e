//! Bundle adjustment of a camera pose chain.
//!
//! Free parameters are a 3-vector rotation (axis–angle) and a translation
//! for every camera except camera 0, which stays fixed as the gauge
//! reference; fixing one camera removes the global rigid-transform
//! ambiguity of multi-view reconstruction. The residual re-triangulates
//! every wand observation under the candidate pose set and returns the
//! per-point mean reprojection errors.

use anyhow::{ensure, Result};
use log::warn;
use nalgebra::{DVector, Rotation3};

use mocap_core::{CalibrationSample, CameraPose, Mat3, Real, Vec3};
use mocap_linear::triangulation::{reprojection_error, triangulate_point};

use crate::backend::LmBackend;
use crate::traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

/// Residual assigned to a point that fails to triangulate under a
/// candidate pose set. Large enough to repel the solver from degenerate
/// configurations without overflowing the normal equations.
const DEGENERATE_RESIDUAL: Real = 1e6;

/// Options for pose-chain refinement.
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    /// Also free one focal length per camera. Numerically fragile; the
    /// rotation/translation-only default is the supported configuration.
    pub refine_focal: bool,
    pub solve: SolveOptions,
}

/// Refined chain plus solver diagnostics.
#[derive(Debug, Clone)]
pub struct BundleResult {
    pub poses: Vec<CameraPose>,
    /// Mean per-point reprojection error after refinement.
    pub mean_reproj_error: Real,
    pub report: SolveReport,
}

struct PoseChainProblem<'a> {
    samples: &'a [CalibrationSample],
    intrinsics: &'a [Mat3],
    gauge_pose: CameraPose,
    num_cameras: usize,
    refine_focal: bool,
}

impl PoseChainProblem<'_> {
    fn unpack(&self, x: &DVector<Real>) -> (Vec<Mat3>, Vec<CameraPose>) {
        let n = self.num_cameras;
        let mut ks: Vec<Mat3> = self.intrinsics.to_vec();
        let mut offset = 0;
        if self.refine_focal {
            for (i, k) in ks.iter_mut().enumerate() {
                let f = x[i];
                k[(0, 0)] = f;
                k[(1, 1)] = f;
            }
            offset = n;
        }

        let mut poses = Vec::with_capacity(n);
        poses.push(self.gauge_pose.clone());
        for i in 0..n - 1 {
            let base = offset + 6 * i;
            let rotvec = Vec3::new(x[base], x[base + 1], x[base + 2]);
            let t = Vec3::new(x[base + 3], x[base + 4], x[base + 5]);
            poses.push(CameraPose::new(
                *Rotation3::from_scaled_axis(rotvec).matrix(),
                t,
            ));
        }
        (ks, poses)
    }

    fn pack(intrinsics: &[Mat3], poses: &[CameraPose], refine_focal: bool) -> DVector<Real> {
        let n = poses.len();
        let dim = if refine_focal { n + 6 * (n - 1) } else { 6 * (n - 1) };
        let mut x = DVector::zeros(dim);
        let mut offset = 0;
        if refine_focal {
            for (i, k) in intrinsics.iter().enumerate() {
                x[i] = k[(0, 0)];
            }
            offset = n;
        }
        for (i, pose) in poses.iter().skip(1).enumerate() {
            let rotvec = Rotation3::from_matrix_unchecked(pose.r).scaled_axis();
            let base = offset + 6 * i;
            x[base] = rotvec.x;
            x[base + 1] = rotvec.y;
            x[base + 2] = rotvec.z;
            x[base + 3] = pose.t.x;
            x[base + 4] = pose.t.y;
            x[base + 5] = pose.t.z;
        }
        x
    }
}

impl NllsProblem for PoseChainProblem<'_> {
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let (ks, poses) = self.unpack(x);
        let projections = match mocap_core::projection_matrices(&ks, &poses) {
            Ok(p) => p,
            Err(_) => return DVector::from_element(self.samples.len(), DEGENERATE_RESIDUAL),
        };

        let residuals: Vec<Real> = self
            .samples
            .iter()
            .map(|sample| {
                triangulate_point(sample, &projections)
                    .and_then(|point| reprojection_error(sample, &point, &ks, &poses))
                    .unwrap_or(DEGENERATE_RESIDUAL)
            })
            .collect();
        DVector::from_vec(residuals)
    }
}

fn mean_error(
    samples: &[CalibrationSample],
    intrinsics: &[Mat3],
    poses: &[CameraPose],
) -> Option<Real> {
    let projections = mocap_core::projection_matrices(intrinsics, poses).ok()?;
    let errors: Vec<Real> = samples
        .iter()
        .filter_map(|sample| {
            let point = triangulate_point(sample, &projections)?;
            reprojection_error(sample, &point, intrinsics, poses)
        })
        .collect();
    if errors.is_empty() {
        return None;
    }
    Some(errors.iter().sum::<Real>() / errors.len() as Real)
}

/// Refine an initial pose chain by minimizing total reprojection error.
///
/// The refined chain never reports a higher mean reprojection error than
/// the input chain: if the solver diverges, the initial poses are returned
/// unchanged.
pub fn refine_pose_chain(
    samples: &[CalibrationSample],
    intrinsics: &[Mat3],
    initial: &[CameraPose],
    opts: &BundleOptions,
) -> Result<BundleResult> {
    ensure!(
        initial.len() == intrinsics.len(),
        "pose count {} != intrinsics count {}",
        initial.len(),
        intrinsics.len()
    );
    ensure!(initial.len() >= 2, "need at least 2 cameras");

    // Rows that can never triangulate contribute nothing; drop them once
    // so the residual vector keeps a fixed length across iterations.
    let eligible: Vec<CalibrationSample> = samples
        .iter()
        .filter(|sample| sample.iter().flatten().count() >= 2)
        .cloned()
        .collect();
    ensure!(!eligible.is_empty(), "no observation row has 2 or more views");

    let problem = PoseChainProblem {
        samples: &eligible,
        intrinsics,
        gauge_pose: initial[0].clone(),
        num_cameras: initial.len(),
        refine_focal: opts.refine_focal,
    };
    let x0 = PoseChainProblem::pack(intrinsics, initial, opts.refine_focal);

    let initial_error = mean_error(&eligible, intrinsics, initial);
    let (x_opt, report) = LmBackend.solve(&problem, x0, &opts.solve);
    let (ks, refined) = problem.unpack(&x_opt);

    let refined_error = mean_error(&eligible, &ks, &refined);
    match (initial_error, refined_error) {
        (Some(before), Some(after)) if after <= before => Ok(BundleResult {
            poses: refined,
            mean_reproj_error: after,
            report,
        }),
        (Some(before), _) => {
            warn!(
                "bundle adjustment did not improve (before {before:.6}); keeping initial poses"
            );
            Ok(BundleResult {
                poses: initial.to_vec(),
                mean_reproj_error: before,
                report,
            })
        }
        (None, Some(after)) => Ok(BundleResult {
            poses: refined,
            mean_reproj_error: after,
            report,
        }),
        (None, None) => anyhow::bail!("reprojection error undefined before and after refinement"),
    }
}
