//! High-level entry crate for the `mocap-rs` toolbox.
//!
//! Reconstructs 3D positions and headings of rigid LED markers observed by
//! several fixed, intrinsically calibrated cameras. Detection and
//! undistortion happen upstream; this workspace consumes per-camera 2D
//! point lists and produces tracked 3D objects.
//!
//! # Typical session
//!
//! ```no_run
//! use std::sync::Arc;
//! use mocap::pipeline::{CalibrationRunner, FrameProcessor, SharedContext};
//! use mocap::core::{FramePoints, Mat3};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let intrinsics: Vec<Mat3> = /* one 3×3 K per camera */
//! # vec![];
//! let context = SharedContext::new(intrinsics);
//!
//! // Out-of-band: operator calibrates poses from wand captures.
//! let runner = CalibrationRunner::new(context.clone());
//! let wand_samples = /* synchronized per-camera observations */
//! # vec![];
//! let report = runner.calibrate_poses(&wand_samples)?;
//! println!("mean reprojection error: {}", report.mean_reproj_error);
//!
//! // Per frame: the capture loop feeds detections through the stages.
//! context.with_state(|m| m.mark_cameras_found())?;
//! context.with_state(|m| m.start_image_processing())?;
//! context.with_state(|m| m.start_capturing_points())?;
//! context.with_state(|m| m.start_triangulating_points())?;
//!
//! let mut processor = FrameProcessor::new(context.clone());
//! let frame: FramePoints = /* per-camera dot lists from the detector */
//! # FramePoints::default();
//! let output = processor.process(&frame);
//! # let _ = output;
//! # Ok(())
//! # }
//! ```
//!
//! # Module organization
//!
//! - **[`core`]**: math types, camera model, RANSAC, transport types
//! - **[`linear`]**: DLT triangulation, epipolar solvers, pose chaining,
//!   world calibration
//! - **[`optim`]**: bundle adjustment of pose chains
//! - **[`pipeline`]**: correspondence, tracking, state machine, frame loop
//! - **[`prelude`]**: convenient re-exports for common use

/// Math types, camera model, and RANSAC primitives.
pub mod core {
    pub use mocap_core::*;
}

/// Closed-form multi-view geometry.
pub mod linear {
    pub use mocap_linear::*;
}

/// Nonlinear pose refinement.
pub mod optim {
    pub use mocap_optim::*;
}

/// Per-frame pipeline, tracking and calibration actions.
pub mod pipeline {
    pub use mocap_pipeline::*;
}

/// Convenient re-exports for common use cases.
pub mod prelude {
    pub use crate::core::{
        CalibrationSample, CameraPose, CameraPoseData, FramePoints, Mat3, ObjectPoint, Pt2, Pt3,
        RansacOptions, Real, Vec2, Vec3, WorldTransformData,
    };
    pub use crate::linear::{estimate_pose_chain, WorldTransform};
    pub use crate::optim::{refine_pose_chain, BundleOptions};
    pub use crate::pipeline::{
        CalibrationRunner, CaptureState, FrameLoop, FrameOutput, FrameProcessor, MarkerTracker,
        PairingOptions, SharedContext, TrackedObject, TrackerConfig,
    };
}
