//! Essential matrix recovery and decomposition into pose candidates.

use nalgebra::Vector3;

use mocap_core::{Mat3, Vec3};

use super::EpipolarError;

/// Essential matrix from a fundamental matrix and both cameras' intrinsics:
/// `E = K₂ᵀ · F · K₁`.
pub fn essential_from_fundamental(f: &Mat3, k1: &Mat3, k2: &Mat3) -> Mat3 {
    k2.transpose() * f * k1
}

/// Project onto the essential manifold: singular values forced to
/// `(σ, σ, 0)` with `σ` the mean of the two largest.
fn enforce_essential_constraints(e: &Mat3) -> Result<Mat3, EpipolarError> {
    let svd = e.svd(true, true);
    let u = svd.u.ok_or(EpipolarError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(EpipolarError::SvdFailed)?;
    let s = 0.5 * (svd.singular_values[0] + svd.singular_values[1]);
    let s_mat = Mat3::from_diagonal(&Vector3::new(s, s, 0.0));
    Ok(u * s_mat * v_t)
}

/// Decompose an essential matrix into the four canonical `(R, t)`
/// candidates.
///
/// The translation is unit-length (direction only); the physically valid
/// candidate must be selected by a cheirality check on triangulated points.
pub fn decompose_essential(e: &Mat3) -> Result<[(Mat3, Vec3); 4], EpipolarError> {
    let e = enforce_essential_constraints(e)?;
    let svd = e.svd(true, true);
    let mut u = svd.u.ok_or(EpipolarError::SvdFailed)?;
    let mut v_t = svd.v_t.ok_or(EpipolarError::SvdFailed)?;

    // Keep both factors proper rotations before composing.
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let w = Mat3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t: Vec3 = u.column(2).normalize();

    let mut candidates = [(r1, t), (r1, -t), (r2, t), (r2, -t)];
    for (r, t) in candidates.iter_mut() {
        if r.determinant() < 0.0 {
            *r = -*r;
            *t = -*t;
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_core::{skew, Real};
    use nalgebra::Rotation3;

    fn rotation_angle(r: &Mat3) -> Real {
        (((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0)).acos()
    }

    #[test]
    fn decomposition_contains_true_pose() {
        let rot = *Rotation3::from_euler_angles(0.12, -0.07, 0.25).matrix();
        let t = Vec3::new(0.15, 0.03, -0.05);
        let e = skew(&t) * rot;

        let candidates = decompose_essential(&e).unwrap();
        let found = candidates.iter().any(|(r_est, t_est)| {
            let ang = rotation_angle(&(r_est.transpose() * rot));
            let dir = 1.0 - t_est.normalize().dot(&t.normalize()).abs();
            ang < 1e-6 && dir < 1e-6
        });
        assert!(found, "true pose missing from the four candidates");
    }

    #[test]
    fn all_candidates_are_proper_rotations() {
        let rot = *Rotation3::from_euler_angles(-0.3, 0.1, 0.05).matrix();
        let t = Vec3::new(-0.02, 0.2, 0.07);
        let e = skew(&t) * rot;

        for (r, t) in decompose_essential(&e).unwrap() {
            assert!((r.determinant() - 1.0).abs() < 1e-9);
            assert!((t.norm() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn essential_from_fundamental_applies_intrinsics() {
        let k = Mat3::new(320.0, 0.0, 160.0, 0.0, 320.0, 160.0, 0.0, 0.0, 1.0);
        let f = Mat3::new(0.0, -1.0, 2.0, 1.0, 0.0, -3.0, -2.0, 3.0, 0.0);
        let e = essential_from_fundamental(&f, &k, &k);
        let expected = k.transpose() * f * k;
        assert!((e - expected).norm() < 1e-12);
    }
}
