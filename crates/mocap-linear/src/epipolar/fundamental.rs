//! Normalized 8-point fundamental matrix estimation, plain and robust.

use nalgebra::{DMatrix, Vector3};

use mocap_core::{ransac, Estimator, Mat3, Pt2, RansacOptions, Real};

use super::{epipolar_line, line_point_distance, EpipolarError};

/// Hartley normalization: translate to the centroid and scale so the mean
/// distance from the origin is √2. The plain 8-point
/// system is badly scaled in raw pixel coordinates without it.
fn normalization_transform(points: &[&Pt2]) -> Mat3 {
    let n = points.len() as Real;
    let cx = points.iter().map(|p| p.x).sum::<Real>() / n;
    let cy = points.iter().map(|p| p.y).sum::<Real>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<Real>()
        / n;
    let s = if mean_dist > 1e-12 {
        (2.0 as Real).sqrt() / mean_dist
    } else {
        1.0
    };
    Mat3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn apply_transform(t: &Mat3, p: &Pt2) -> Pt2 {
    let v = t * Vector3::new(p.x, p.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Project a 3×3 matrix onto rank 2 by zeroing its smallest singular value.
fn enforce_rank2(f: &Mat3) -> Result<Mat3, EpipolarError> {
    let svd = f.svd(true, true);
    let u = svd.u.ok_or(EpipolarError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(EpipolarError::SvdFailed)?;
    let s = Mat3::from_diagonal(&Vector3::new(
        svd.singular_values[0],
        svd.singular_values[1],
        0.0,
    ));
    Ok(u * s * v_t)
}

/// Normalized 8-point algorithm for the fundamental matrix.
///
/// `pts1` and `pts2` are corresponding pixel points in two images. The
/// returned matrix is rank-2 and satisfies `x'ᵀ F x = 0` up to numerical
/// error.
pub fn fundamental_8point(pts1: &[Pt2], pts2: &[Pt2]) -> Result<Mat3, EpipolarError> {
    if pts1.len() < 8 || pts1.len() != pts2.len() {
        return Err(EpipolarError::NotEnoughPoints {
            needed: 8,
            got: pts1.len().min(pts2.len()),
        });
    }

    let refs1: Vec<&Pt2> = pts1.iter().collect();
    let refs2: Vec<&Pt2> = pts2.iter().collect();
    let t1 = normalization_transform(&refs1);
    let t2 = normalization_transform(&refs2);

    let mut a = DMatrix::<Real>::zeros(pts1.len(), 9);
    for (row, (p1, p2)) in pts1.iter().zip(pts2).enumerate() {
        let q1 = apply_transform(&t1, p1);
        let q2 = apply_transform(&t2, p2);
        let (x, y) = (q1.x, q1.y);
        let (xp, yp) = (q2.x, q2.y);
        let coeffs = [xp * x, xp * y, xp, yp * x, yp * y, yp, x, y, 1.0];
        for (col, c) in coeffs.iter().enumerate() {
            a[(row, col)] = *c;
        }
    }

    // Work on the 9×9 normal matrix: a thin SVD of the stacked system
    // would drop the nullspace vector for a minimal 8-point sample.
    let ata = a.transpose() * &a;
    let svd = ata.svd(false, true);
    let v_t = svd.v_t.ok_or(EpipolarError::SvdFailed)?;
    let f_vec = v_t.row(8);
    let f_normalized = Mat3::new(
        f_vec[0], f_vec[1], f_vec[2], f_vec[3], f_vec[4], f_vec[5], f_vec[6], f_vec[7], f_vec[8],
    );

    let f_rank2 = enforce_rank2(&f_normalized)?;
    Ok(t2.transpose() * f_rank2 * t1)
}

/// Corresponding pixel points in two images.
type Correspondence = (Pt2, Pt2);

struct FundamentalEstimator;

impl Estimator for FundamentalEstimator {
    type Datum = Correspondence;
    type Model = Mat3;

    const MIN_SAMPLES: usize = 8;

    fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
        let pts1: Vec<Pt2> = sample.iter().map(|&i| data[i].0).collect();
        let pts2: Vec<Pt2> = sample.iter().map(|&i| data[i].1).collect();
        fundamental_8point(&pts1, &pts2).ok()
    }

    fn residual(model: &Self::Model, (p1, p2): &Self::Datum) -> Real {
        // Symmetric epipolar distance: average of the two point-to-line
        // distances.
        let d12 = line_point_distance(&epipolar_line(model, p1), p2);
        let d21 = line_point_distance(&epipolar_line(&model.transpose(), p2), p1);
        0.5 * (d12 + d21)
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        if inliers.len() < 8 {
            return None;
        }
        let pts1: Vec<Pt2> = inliers.iter().map(|&i| data[i].0).collect();
        let pts2: Vec<Pt2> = inliers.iter().map(|&i| data[i].1).collect();
        fundamental_8point(&pts1, &pts2).ok()
    }
}

/// Robust fundamental matrix estimation: normalized 8-point inside RANSAC,
/// refit on the consensus set.
pub fn fundamental_8point_ransac(
    pts1: &[Pt2],
    pts2: &[Pt2],
    opts: &RansacOptions,
) -> Result<(Mat3, Vec<usize>), EpipolarError> {
    if pts1.len() < 8 || pts1.len() != pts2.len() {
        return Err(EpipolarError::NotEnoughPoints {
            needed: 8,
            got: pts1.len().min(pts2.len()),
        });
    }
    let data: Vec<Correspondence> = pts1.iter().copied().zip(pts2.iter().copied()).collect();
    let result = ransac::<FundamentalEstimator>(&data, opts);
    match result.model {
        Some(f) => Ok((f, result.inliers)),
        None => Err(EpipolarError::RansacFailed),
    }
}
