//! Core math and geometry primitives for `mocap-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the camera model (intrinsics + pose + derived projection matrix),
//! - per-frame and calibration input types,
//! - serializable pose/transform transport types,
//! - a generic RANSAC engine (`ransac`, [`Estimator`]).
//!
//! Image points entering this crate are assumed to be undistorted already;
//! the upstream detector applies the lens model before handing points over.

/// Camera model and pose types.
pub mod camera;
/// Per-frame and calibration observation types.
pub mod frame;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Generic RANSAC engine and traits.
pub mod ransac;
/// Plain nested-array transport representations.
pub mod serial;

pub use camera::*;
pub use frame::*;
pub use math::*;
pub use ransac::*;
pub use serial::*;
