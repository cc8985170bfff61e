//! Initial camera poses from pairwise essential-matrix chaining.
//!
//! Cameras are processed in index order. For each adjacent pair the
//! fundamental matrix is estimated robustly, converted to an essential
//! matrix, decomposed into the four pose candidates, and disambiguated by a
//! cheirality count over triangulated wand points. The chosen relative pose
//! is composed onto the running chain; camera 0 stays at identity.

use log::debug;
use thiserror::Error;

use mocap_core::{projection_matrices, CalibrationSample, CameraPose, Mat3, Pt2, RansacOptions};

use crate::epipolar::{
    decompose_essential, essential_from_fundamental, fundamental_8point_ransac, EpipolarError,
};
use crate::triangulation::triangulate_points;

/// Errors from pose-chain initialization. Any of these aborts the whole
/// chain; previously committed poses are left untouched by the caller.
#[derive(Debug, Error)]
pub enum PoseChainError {
    #[error("need at least 2 cameras, got {0}")]
    TooFewCameras(usize),
    #[error("camera pair {pair} shares only {got} observations (need 8)")]
    NotEnoughMatches { pair: usize, got: usize },
    #[error("fundamental matrix estimation failed for camera pair {pair}")]
    FundamentalFailed {
        pair: usize,
        #[source]
        source: EpipolarError,
    },
    #[error("essential decomposition failed for camera pair {pair}")]
    DecompositionFailed {
        pair: usize,
        #[source]
        source: EpipolarError,
    },
}

/// Matched observations of one adjacent camera pair.
fn shared_observations(
    samples: &[CalibrationSample],
    cam_a: usize,
    cam_b: usize,
) -> (Vec<Pt2>, Vec<Pt2>) {
    let mut pts_a = Vec::new();
    let mut pts_b = Vec::new();
    for sample in samples {
        if let (Some(pa), Some(pb)) = (&sample[cam_a], &sample[cam_b]) {
            pts_a.push(*pa);
            pts_b.push(*pb);
        }
    }
    (pts_a, pts_b)
}

/// Cheirality score of one pose candidate: triangulate the pair's points
/// under `[chain_tail, candidate]` and count positive depths in the global
/// frame plus positive depths of the rotated points.
fn cheirality_count(
    pts_a: &[Pt2],
    pts_b: &[Pt2],
    k_a: &Mat3,
    k_b: &Mat3,
    chain_tail: &CameraPose,
    candidate: &CameraPose,
) -> usize {
    let samples: Vec<CalibrationSample> = pts_a
        .iter()
        .zip(pts_b)
        .map(|(a, b)| vec![Some(*a), Some(*b)])
        .collect();
    let ks = [*k_a, *k_b];
    let poses = [chain_tail.clone(), candidate.clone()];
    let projections = match projection_matrices(&ks, &poses) {
        Ok(p) => p,
        Err(_) => return 0,
    };

    let mut count = 0usize;
    for point in triangulate_points(&samples, &projections).into_iter().flatten() {
        if point.z > 0.0 {
            count += 1;
        }
        if (candidate.r.transpose() * point.coords).z > 0.0 {
            count += 1;
        }
    }
    count
}

/// Estimate one pose per camera from synchronized wand observations, with
/// camera 0 fixed at identity.
///
/// `samples` are aligned rows (`sample[cam]` is what camera `cam` saw of
/// the wand in that capture instant, `None` when occluded). The result is
/// an initial chain; refine it with bundle adjustment before use.
pub fn estimate_pose_chain(
    samples: &[CalibrationSample],
    intrinsics: &[Mat3],
    opts: &RansacOptions,
) -> Result<Vec<CameraPose>, PoseChainError> {
    let num_cameras = intrinsics.len();
    if num_cameras < 2 {
        return Err(PoseChainError::TooFewCameras(num_cameras));
    }

    let mut poses = vec![CameraPose::identity()];
    for pair in 0..num_cameras - 1 {
        let (pts_a, pts_b) = shared_observations(samples, pair, pair + 1);
        if pts_a.len() < 8 {
            return Err(PoseChainError::NotEnoughMatches {
                pair,
                got: pts_a.len(),
            });
        }

        let (f, inliers) = fundamental_8point_ransac(&pts_a, &pts_b, opts)
            .map_err(|source| PoseChainError::FundamentalFailed { pair, source })?;
        debug!(
            "pair {}/{}: {} of {} wand matches are epipolar inliers",
            pair,
            pair + 1,
            inliers.len(),
            pts_a.len()
        );

        let e = essential_from_fundamental(&f, &intrinsics[pair], &intrinsics[pair + 1]);
        let candidates = decompose_essential(&e)
            .map_err(|source| PoseChainError::DecompositionFailed { pair, source })?;

        let chain_tail = poses.last().expect("chain is non-empty").clone();
        let mut best: Option<(usize, CameraPose)> = None;
        for (r, t) in candidates {
            let candidate = CameraPose::new(r, t);
            let count = cheirality_count(
                &pts_a,
                &pts_b,
                &intrinsics[pair],
                &intrinsics[pair + 1],
                &chain_tail,
                &candidate,
            );
            let is_better = best.as_ref().map(|(c, _)| count > *c).unwrap_or(true);
            if is_better {
                best = Some((count, candidate));
            }
        }
        let (count, relative) = best.expect("four candidates were scored");
        debug!("pair {}: cheirality count {}", pair, count);

        // Compose the relative pose onto the chain.
        poses.push(CameraPose::new(
            relative.r * chain_tail.r,
            chain_tail.t + chain_tail.r * relative.t,
        ));
    }

    Ok(poses)
}

/// Default RANSAC settings for wand captures: 3 px threshold, high
/// confidence, matching the thresholds the capture UI was tuned against.
pub fn wand_ransac_options() -> RansacOptions {
    RansacOptions {
        thresh: 3.0,
        confidence: 0.99999,
        ..RansacOptions::default()
    }
}

/// Sanity helper for pose updates coming back from refinement: every
/// rotation must still be orthonormal.
pub fn validate_chain(poses: &[CameraPose]) -> bool {
    poses.iter().all(CameraPose::is_orthonormal)
}
