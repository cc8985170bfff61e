//! Shared reconstruction state.
//!
//! Camera poses, the world transform and the capture state are written
//! only by operator/calibration actions and read every frame. Writers
//! publish a whole new snapshot behind an `RwLock`; the frame loop clones
//! the `Arc` once per frame and never observes a partially updated pose
//! set. A single in-flight calibration is enforced with an atomic flag;
//! a second request is rejected, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use mocap_core::{CameraPose, Mat3};
use mocap_linear::WorldTransform;

use crate::state::{CaptureState, StateMachine};

/// Everything the per-frame path needs from calibration, immutable once
/// published.
#[derive(Debug, Clone)]
pub struct ReconstructionSnapshot {
    pub poses: Vec<CameraPose>,
    pub world: WorldTransform,
}

/// Errors from calibration admission control.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("a calibration action is already in flight")]
    CalibrationBusy,
    #[error("snapshot has {got} poses for {expected} cameras")]
    PoseCountMismatch { expected: usize, got: usize },
}

/// Process-wide shared state for one capture session.
pub struct SharedContext {
    intrinsics: Vec<Mat3>,
    snapshot: RwLock<Arc<ReconstructionSnapshot>>,
    machine: RwLock<StateMachine>,
    calibrating: AtomicBool,
}

impl SharedContext {
    /// New context with identity poses and an identity world transform.
    pub fn new(intrinsics: Vec<Mat3>) -> Arc<Self> {
        let poses = vec![CameraPose::identity(); intrinsics.len()];
        Arc::new(Self {
            intrinsics,
            snapshot: RwLock::new(Arc::new(ReconstructionSnapshot {
                poses,
                world: WorldTransform::default(),
            })),
            machine: RwLock::new(StateMachine::new()),
            calibrating: AtomicBool::new(false),
        })
    }

    pub fn num_cameras(&self) -> usize {
        self.intrinsics.len()
    }

    pub fn intrinsics(&self) -> &[Mat3] {
        &self.intrinsics
    }

    /// Current snapshot; cheap to call once per frame.
    pub fn snapshot(&self) -> Arc<ReconstructionSnapshot> {
        self.snapshot.read().clone()
    }

    /// Atomically replace the whole snapshot.
    pub fn publish(&self, snapshot: ReconstructionSnapshot) -> Result<(), ContextError> {
        if snapshot.poses.len() != self.intrinsics.len() {
            return Err(ContextError::PoseCountMismatch {
                expected: self.intrinsics.len(),
                got: snapshot.poses.len(),
            });
        }
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }

    /// Replace the poses, keeping the current world transform.
    pub fn publish_poses(&self, poses: Vec<CameraPose>) -> Result<(), ContextError> {
        let world = self.snapshot().world.clone();
        self.publish(ReconstructionSnapshot { poses, world })
    }

    /// Replace the world transform, keeping the current poses.
    pub fn publish_world(&self, world: WorldTransform) -> Result<(), ContextError> {
        let poses = self.snapshot().poses.clone();
        self.publish(ReconstructionSnapshot { poses, world })
    }

    pub fn capture_state(&self) -> CaptureState {
        self.machine.read().state()
    }

    /// Run one validated state-machine transition under the write lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut StateMachine) -> R) -> R {
        f(&mut self.machine.write())
    }

    /// Claim the calibration slot. The returned guard releases it on drop;
    /// while it lives, further claims fail with
    /// [`ContextError::CalibrationBusy`].
    pub fn begin_calibration(&self) -> Result<CalibrationGuard<'_>, ContextError> {
        if self
            .calibrating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ContextError::CalibrationBusy);
        }
        Ok(CalibrationGuard { context: self })
    }
}

/// RAII claim on the single calibration slot.
pub struct CalibrationGuard<'a> {
    context: &'a SharedContext,
}

impl Drop for CalibrationGuard<'_> {
    fn drop(&mut self) {
        self.context.calibrating.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_core::Vec3;

    fn intrinsics() -> Mat3 {
        Mat3::new(320.0, 0.0, 160.0, 0.0, 320.0, 160.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn snapshot_swap_is_all_or_nothing() {
        let ctx = SharedContext::new(vec![intrinsics(); 2]);
        let before = ctx.snapshot();

        let mut poses = before.poses.clone();
        poses[1].t = Vec3::new(1.0, 2.0, 3.0);
        ctx.publish_poses(poses).unwrap();

        // The old snapshot is unchanged; only new reads see the update.
        assert_eq!(before.poses[1].t, Vec3::zeros());
        assert_eq!(ctx.snapshot().poses[1].t, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn pose_count_mismatch_is_rejected() {
        let ctx = SharedContext::new(vec![intrinsics(); 3]);
        let err = ctx.publish_poses(vec![CameraPose::identity()]).unwrap_err();
        assert!(matches!(err, ContextError::PoseCountMismatch { .. }));
        assert_eq!(ctx.snapshot().poses.len(), 3);
    }

    #[test]
    fn second_calibration_claim_is_rejected() {
        let ctx = SharedContext::new(vec![intrinsics()]);
        let guard = ctx.begin_calibration().unwrap();
        assert!(matches!(
            ctx.begin_calibration(),
            Err(ContextError::CalibrationBusy)
        ));
        drop(guard);
        assert!(ctx.begin_calibration().is_ok());
    }

    #[test]
    fn state_transitions_go_through_the_machine() {
        let ctx = SharedContext::new(vec![intrinsics()]);
        ctx.with_state(|m| m.mark_cameras_found()).unwrap();
        assert_eq!(ctx.capture_state(), CaptureState::CamerasFound);
        assert!(ctx.with_state(|m| m.start_triangulating_points()).is_err());
        assert_eq!(ctx.capture_state(), CaptureState::CamerasFound);
    }
}
