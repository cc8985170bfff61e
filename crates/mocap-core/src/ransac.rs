//! Generic, model-agnostic RANSAC engine.
//!
//! Implement [`Estimator`] for a geometric model and call [`ransac`] with
//! the data and some [`RansacOptions`]. Failure to reach consensus is a
//! `None` model, never a panic: robust estimation failing is an expected
//! outcome on degenerate input.

use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::math::Real;

/// Configuration for the RANSAC loop.
#[derive(Debug, Clone)]
pub struct RansacOptions {
    /// Upper bound on sampling iterations.
    pub max_iters: usize,
    /// Inlier residual threshold, in the estimator's residual units.
    pub thresh: Real,
    /// Minimum consensus size to accept a model.
    pub min_inliers: usize,
    /// Desired probability of having drawn one all-inlier sample.
    pub confidence: Real,
    /// RNG seed; fixed for reproducible calibration runs.
    pub seed: u64,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            thresh: 3.0,
            min_inliers: 8,
            confidence: 0.99999,
            seed: 7_919,
        }
    }
}

/// Outcome of a RANSAC run. `model` is `None` when no consensus was found.
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: Option<M>,
    /// Indices of inlier data points for the returned model.
    pub inliers: Vec<usize>,
    /// Root-mean-square residual over the inliers.
    pub inlier_rms: Real,
    /// Iterations actually performed.
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: Real::INFINITY,
            iters: 0,
        }
    }
}

/// A model that can be estimated from a minimal sample and scored per datum.
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal number of samples needed to fit one model.
    const MIN_SAMPLES: usize;

    /// Fit a model from the data at `sample`. `None` when the subset is
    /// degenerate or the fit fails.
    fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum, in the same units as
    /// [`RansacOptions::thresh`].
    fn residual(model: &Self::Model, datum: &Self::Datum) -> Real;

    /// Optional refit over the full inlier set before final scoring.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

/// Number of iterations needed to hit `confidence` at the observed inlier
/// ratio. Standard RANSAC stopping criterion.
fn required_iterations(confidence: Real, inlier_ratio: Real, min_samples: usize) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    let good_sample_p = inlier_ratio.powi(min_samples as i32);
    let denom = (1.0 - good_sample_p).max(1e-12).ln();
    if denom >= 0.0 {
        return usize::MAX;
    }
    ((1.0 - confidence).ln() / denom).ceil() as usize
}

fn collect_inliers<E: Estimator>(
    model: &E::Model,
    data: &[E::Datum],
    thresh: Real,
) -> (Vec<usize>, Real) {
    let mut inliers = Vec::new();
    let mut sum_sq = 0.0;
    for (i, datum) in data.iter().enumerate() {
        let r = E::residual(model, datum);
        if r <= thresh {
            inliers.push(i);
            sum_sq += r * r;
        }
    }
    let rms = if inliers.is_empty() {
        Real::INFINITY
    } else {
        (sum_sq / inliers.len() as Real).sqrt()
    };
    (inliers, rms)
}

/// Run RANSAC for the given [`Estimator`].
pub fn ransac<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let mut best = RansacResult::default();
    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let indices: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut iter_budget = opts.max_iters;

    let mut iters = 0;
    while iters < iter_budget {
        iters += 1;
        let sample: Vec<usize> = indices
            .choose_multiple(&mut rng, E::MIN_SAMPLES)
            .copied()
            .collect();

        let Some(model) = E::fit(data, &sample) else {
            continue;
        };

        let (mut inliers, mut rms) = collect_inliers::<E>(&model, data, opts.thresh);
        if inliers.len() < opts.min_inliers {
            continue;
        }

        let mut model = model;
        if let Some(refined) = E::refit(data, &inliers) {
            let (refined_inliers, refined_rms) = collect_inliers::<E>(&refined, data, opts.thresh);
            if refined_inliers.len() >= inliers.len() {
                model = refined;
                inliers = refined_inliers;
                rms = refined_rms;
            }
        }

        let better = inliers.len() > best.inliers.len()
            || (inliers.len() == best.inliers.len() && rms < best.inlier_rms);
        if better {
            let ratio = inliers.len() as Real / data.len() as Real;
            iter_budget = required_iterations(opts.confidence, ratio, E::MIN_SAMPLES)
                .clamp(iters, opts.max_iters);
            best.model = Some(model);
            best.inliers = inliers;
            best.inlier_rms = rms;
            best.iters = iters;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2D line `y = m·x + b` fitted from two points.
    #[derive(Debug, Clone)]
    struct Line {
        m: Real,
        b: Real,
    }

    struct LineEstimator;

    impl Estimator for LineEstimator {
        type Datum = (Real, Real);
        type Model = Line;

        const MIN_SAMPLES: usize = 2;

        fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
            let (x0, y0) = data[sample[0]];
            let (x1, y1) = data[sample[1]];
            let dx = x1 - x0;
            if dx.abs() < 1e-9 {
                return None;
            }
            let m = (y1 - y0) / dx;
            Some(Line { m, b: y0 - m * x0 })
        }

        fn residual(model: &Self::Model, &(x, y): &Self::Datum) -> Real {
            (model.m * x - y + model.b).abs() / (model.m * model.m + 1.0).sqrt()
        }
    }

    fn opts() -> RansacOptions {
        RansacOptions {
            max_iters: 300,
            thresh: 0.05,
            min_inliers: 5,
            confidence: 0.999,
            seed: 11,
        }
    }

    #[test]
    fn too_little_data_yields_no_model() {
        let res = ransac::<LineEstimator>(&[(0.0, 0.0)], &opts());
        assert!(res.model.is_none());
        assert!(res.inliers.is_empty());
    }

    #[test]
    fn line_survives_gross_outliers() {
        let mut data: Vec<(Real, Real)> = (0..12)
            .map(|i| {
                let x = i as Real * 0.4;
                (x, 1.5 * x - 2.0)
            })
            .collect();
        data.push((1.0, 40.0));
        data.push((2.0, -35.0));
        data.push((3.5, 18.0));

        let res = ransac::<LineEstimator>(&data, &opts());
        let line = res.model.expect("consensus line");
        assert!((line.m - 1.5).abs() < 1e-6, "slope {}", line.m);
        assert!((line.b + 2.0).abs() < 1e-6, "intercept {}", line.b);
        assert_eq!(res.inliers.len(), 12);
    }

    #[test]
    fn early_exit_once_confident() {
        let data: Vec<(Real, Real)> = (0..50).map(|i| (i as Real, 2.0 * i as Real)).collect();
        let res = ransac::<LineEstimator>(&data, &opts());
        assert!(res.model.is_some());
        // all-inlier data collapses the iteration budget immediately
        assert!(res.iters < 300);
    }
}
