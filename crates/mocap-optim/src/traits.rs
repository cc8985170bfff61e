//! Problem and backend abstractions for nonlinear least squares.

use nalgebra::{DMatrix, DVector};

use mocap_core::Real;

/// A dense nonlinear least-squares problem over a flat parameter vector.
pub trait NllsProblem {
    /// Residual vector at `x`. The length must not depend on `x`.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Jacobian of the residuals at `x`.
    ///
    /// The default is a central finite difference; override when an
    /// analytic form exists.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        numeric_jacobian(self, x)
    }
}

/// Central-difference Jacobian with per-parameter step scaling.
///
/// The residual here re-triangulates points internally, so an analytic
/// Jacobian would need a differentiable SVD; numeric differentiation is the
/// honest option.
pub fn numeric_jacobian<P: NllsProblem + ?Sized>(problem: &P, x: &DVector<Real>) -> DMatrix<Real> {
    let m = problem.residuals(x).len();
    let n = x.len();
    let mut jac = DMatrix::<Real>::zeros(m, n);

    let mut x_plus = x.clone();
    let mut x_minus = x.clone();
    for j in 0..n {
        let step = 1e-6 * x[j].abs().max(1.0);
        x_plus[j] = x[j] + step;
        x_minus[j] = x[j] - step;
        let r_plus = problem.residuals(&x_plus);
        let r_minus = problem.residuals(&x_minus);
        for i in 0..m {
            jac[(i, j)] = (r_plus[i] - r_minus[i]) / (2.0 * step);
        }
        x_plus[j] = x[j];
        x_minus[j] = x[j];
    }
    jac
}

/// Solver configuration shared by all backends.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Relative cost-change tolerance.
    pub ftol: Real,
    /// Gradient tolerance.
    pub gtol: Real,
    /// Iteration budget.
    pub max_iters: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-9,
            gtol: 1e-12,
            max_iters: 100,
        }
    }
}

/// Summary of one solver run.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub iterations: usize,
    pub final_cost: Real,
    pub converged: bool,
}

/// A solver capable of minimizing any [`NllsProblem`].
pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
