//! Closed-form multi-view geometry for `mocap-rs`.
//!
//! Everything in this crate is linear or combinatorial: DLT triangulation,
//! epipolar solvers, essential-matrix pose chaining, and world-frame
//! calibration. Nonlinear refinement lives in `mocap-optim`.

/// Fundamental/essential matrix estimation and decomposition.
pub mod epipolar;
/// Pairwise essential-matrix pose chaining with cheirality selection.
pub mod pose_chain;
/// DLT point triangulation and reprojection errors.
pub mod triangulation;
/// Floor/origin/scale alignment of the reconstruction frame.
pub mod world;

pub use pose_chain::{estimate_pose_chain, PoseChainError};
pub use triangulation::{
    reprojection_error, reprojection_errors, triangulate_point, triangulate_points,
};
pub use world::{fix_scale, WorldError, WorldTransform};
