//! Per-frame reconstruction pipeline for `mocap-rs`.
//!
//! This crate hosts the stateful half of the system: cross-camera
//! correspondence search, rigid-marker pairing and Kalman tracking, the
//! capture state machine, the shared reconstruction context, the
//! fixed-rate frame loop, and the out-of-band calibration actions.
//!
//! The shared state discipline is single-writer-many-readers: calibration
//! and control actions publish whole snapshots; the frame loop reads one
//! snapshot per frame and never blocks a writer.

/// Out-of-band calibration actions.
pub mod calibrate;
/// Shared reconstruction state (poses, world transform, capture state).
pub mod context;
/// Epipolar correspondence search with hypothesis forking.
pub mod correspondence;
/// Per-frame processing and the fixed-rate loop.
pub mod frame;
/// Rigid-marker pairing.
pub mod objects;
/// Capture-stage state machine.
pub mod state;
/// Kalman-filtered marker tracking.
pub mod tracker;

pub use calibrate::{
    spawn_pose_calibration, CalibrationError, CalibrationRunner, PoseCalibrationReport,
    SCALE_WAND_SPACING,
};
pub use context::{ContextError, ReconstructionSnapshot, SharedContext};
pub use correspondence::{find_correspondences, MatchOptions};
pub use frame::{FrameLoop, FrameOutput, FrameProcessor, LoopHandle};
pub use objects::{pair_markers, MarkerDetection, PairingOptions};
pub use state::{CaptureState, StateError, StateMachine};
pub use tracker::{MarkerTracker, TrackedObject, TrackerConfig};
