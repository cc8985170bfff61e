//! Capture-stage state machine.
//!
//! One ordinal enumeration gates which pipeline stages run per frame.
//! Transitions move exactly one level at a time: `start_X` requires the
//! stage immediately below `X`, `stop_X` requires `X` itself. Anything
//! else is rejected and leaves the state unchanged; the machine never
//! clamps or skips levels. `SaveImage` is a one-shot side branch off
//! `CamerasFound`, not a pipeline stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stages in ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaptureState {
    CamerasNotFound,
    CamerasFound,
    /// One-shot side branch off [`CaptureState::CamerasFound`].
    SaveImage,
    ImageProcessing,
    PointCapture,
    Triangulation,
    ObjectDetection,
}

impl CaptureState {
    /// The stage a `start` into this state must come from.
    fn below(self) -> Option<CaptureState> {
        use CaptureState::*;
        match self {
            CamerasNotFound => None,
            CamerasFound => Some(CamerasNotFound),
            // The side branch hangs off CamerasFound, and the main ladder
            // continues from CamerasFound as well.
            SaveImage | ImageProcessing => Some(CamerasFound),
            PointCapture => Some(ImageProcessing),
            Triangulation => Some(PointCapture),
            ObjectDetection => Some(Triangulation),
        }
    }
}

/// Rejected transition. The state is left unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("cannot {action}: expected state {expected:?}, currently {actual:?}")]
    InvalidTransition {
        action: &'static str,
        expected: CaptureState,
        actual: CaptureState,
    },
    #[error("cannot {action}: {target:?} has no stage below it")]
    NoLowerStage {
        action: &'static str,
        target: CaptureState,
    },
}

/// The capture state machine. Mutated only through the validated
/// transitions below.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: CaptureState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: CaptureState::CamerasNotFound,
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Whether a given pipeline stage runs for the current frame. The
    /// save-image side branch is never a per-frame stage.
    pub fn stage_active(&self, stage: CaptureState) -> bool {
        stage != CaptureState::SaveImage && stage <= self.state
    }

    /// Enter `target` from the stage immediately below it.
    pub fn start(&mut self, action: &'static str, target: CaptureState) -> Result<(), StateError> {
        let expected = target.below().ok_or(StateError::NoLowerStage { action, target })?;
        if self.state != expected {
            return Err(StateError::InvalidTransition {
                action,
                expected,
                actual: self.state,
            });
        }
        self.state = target;
        Ok(())
    }

    /// Leave `target`, falling back to the stage immediately below it.
    pub fn stop(&mut self, action: &'static str, target: CaptureState) -> Result<(), StateError> {
        if self.state != target {
            return Err(StateError::InvalidTransition {
                action,
                expected: target,
                actual: self.state,
            });
        }
        self.state = target.below().ok_or(StateError::NoLowerStage { action, target })?;
        Ok(())
    }

    // Named transitions, mirroring the operator-facing actions.

    pub fn mark_cameras_found(&mut self) -> Result<(), StateError> {
        self.start("mark_cameras_found", CaptureState::CamerasFound)
    }

    pub fn mark_cameras_lost(&mut self) -> Result<(), StateError> {
        self.stop("mark_cameras_lost", CaptureState::CamerasFound)
    }

    /// One-shot image save: enters the side branch; [`Self::finish_save_image`]
    /// returns to `CamerasFound`.
    pub fn begin_save_image(&mut self) -> Result<(), StateError> {
        self.start("begin_save_image", CaptureState::SaveImage)
    }

    pub fn finish_save_image(&mut self) -> Result<(), StateError> {
        self.stop("finish_save_image", CaptureState::SaveImage)
    }

    pub fn start_image_processing(&mut self) -> Result<(), StateError> {
        self.start("start_image_processing", CaptureState::ImageProcessing)
    }

    pub fn stop_image_processing(&mut self) -> Result<(), StateError> {
        self.stop("stop_image_processing", CaptureState::ImageProcessing)
    }

    pub fn start_capturing_points(&mut self) -> Result<(), StateError> {
        self.start("start_capturing_points", CaptureState::PointCapture)
    }

    pub fn stop_capturing_points(&mut self) -> Result<(), StateError> {
        self.stop("stop_capturing_points", CaptureState::PointCapture)
    }

    pub fn start_triangulating_points(&mut self) -> Result<(), StateError> {
        self.start("start_triangulating_points", CaptureState::Triangulation)
    }

    pub fn stop_triangulating_points(&mut self) -> Result<(), StateError> {
        self.stop("stop_triangulating_points", CaptureState::Triangulation)
    }

    pub fn start_locating_objects(&mut self) -> Result<(), StateError> {
        self.start("start_locating_objects", CaptureState::ObjectDetection)
    }

    pub fn stop_locating_objects(&mut self) -> Result<(), StateError> {
        self.stop("stop_locating_objects", CaptureState::ObjectDetection)
    }
}
