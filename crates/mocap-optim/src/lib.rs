//! Nonlinear least-squares refinement for `mocap-rs`.
//!
//! One dense problem lives here: bundle adjustment of a camera pose chain
//! against synchronized wand observations. The solver plumbing is split
//! from the problem so tests can drive the backend with toy problems.

/// Levenberg–Marquardt backend.
pub mod backend;
/// Bundle adjustment of camera pose chains.
pub mod bundle;
/// Problem and backend traits shared across optimizations.
pub mod traits;

pub use backend::LmBackend;
pub use bundle::{refine_pose_chain, BundleOptions, BundleResult};
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
