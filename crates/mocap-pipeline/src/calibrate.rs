//! Operator-triggered calibration actions.
//!
//! These run out-of-band from the frame loop, typically on their own
//! thread, and commit results through whole-snapshot publishes, so a
//! failing action leaves previously committed state untouched. The shared
//! context admits one calibration at a time; a second request is rejected
//! with [`CalibrationError::Busy`].

use std::sync::Arc;
use std::thread::JoinHandle;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mocap_core::{poses_to_data, CalibrationSample, CameraPoseData, Pt3, Real};
use mocap_linear::pose_chain::{estimate_pose_chain, wand_ransac_options, PoseChainError};
use mocap_linear::world::{fix_scale, WorldError};
use mocap_optim::{refine_pose_chain, BundleOptions};

use crate::context::{ContextError, SharedContext};

/// Real-world distance between the scale wand's two markers.
pub const SCALE_WAND_SPACING: Real = 0.119;

/// Errors from calibration actions.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("a calibration action is already in flight")]
    Busy,
    #[error(transparent)]
    PoseChain(#[from] PoseChainError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("pose refinement failed: {0}")]
    Refinement(#[source] anyhow::Error),
    #[error(transparent)]
    Context(ContextError),
}

impl From<ContextError> for CalibrationError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::CalibrationBusy => CalibrationError::Busy,
            other => CalibrationError::Context(other),
        }
    }
}

/// Result of a pose calibration, in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseCalibrationReport {
    pub poses: Vec<CameraPoseData>,
    pub mean_reproj_error: Real,
}

/// Entry point for every calibration action of one session.
pub struct CalibrationRunner {
    context: Arc<SharedContext>,
    ransac: mocap_core::RansacOptions,
    bundle: BundleOptions,
}

impl CalibrationRunner {
    pub fn new(context: Arc<SharedContext>) -> Self {
        Self {
            context,
            ransac: wand_ransac_options(),
            bundle: BundleOptions::default(),
        }
    }

    pub fn context(&self) -> &Arc<SharedContext> {
        &self.context
    }

    /// Full pose calibration: essential-matrix chaining followed by bundle
    /// adjustment. Publishes the refined poses on success.
    pub fn calibrate_poses(
        &self,
        samples: &[CalibrationSample],
    ) -> Result<PoseCalibrationReport, CalibrationError> {
        let _slot = self.context.begin_calibration()?;
        let intrinsics = self.context.intrinsics();

        let chain = estimate_pose_chain(samples, intrinsics, &self.ransac)?;
        let refined = refine_pose_chain(samples, intrinsics, &chain, &self.bundle)
            .map_err(CalibrationError::Refinement)?;

        info!(
            "pose calibration: {} cameras, mean reprojection error {:.6}",
            refined.poses.len(),
            refined.mean_reproj_error
        );
        let report = PoseCalibrationReport {
            poses: poses_to_data(&refined.poses),
            mean_reproj_error: refined.mean_reproj_error,
        };
        self.context.publish_poses(refined.poses)?;
        Ok(report)
    }

    /// Bundle adjustment only, starting from the currently published
    /// poses.
    pub fn refine_poses(
        &self,
        samples: &[CalibrationSample],
    ) -> Result<PoseCalibrationReport, CalibrationError> {
        let _slot = self.context.begin_calibration()?;
        let intrinsics = self.context.intrinsics();
        let current = self.context.snapshot().poses.clone();

        let refined = refine_pose_chain(samples, intrinsics, &current, &self.bundle)
            .map_err(CalibrationError::Refinement)?;

        let report = PoseCalibrationReport {
            poses: poses_to_data(&refined.poses),
            mean_reproj_error: refined.mean_reproj_error,
        };
        self.context.publish_poses(refined.poses)?;
        Ok(report)
    }

    /// Floor alignment from a point cloud captured on the physical floor.
    /// Returns the residual flatness of the cloud under the new transform.
    pub fn align_floor(&self, floor_points: &[Pt3]) -> Result<Real, CalibrationError> {
        let _slot = self.context.begin_calibration()?;
        let mut world = self.context.snapshot().world.clone();
        let residual = world.align_floor(floor_points)?;
        info!("floor aligned, residual {residual:.6}");
        self.context.publish_world(world)?;
        Ok(residual)
    }

    /// Fix the world origin at one designated point.
    pub fn set_origin(&self, point: &Pt3) -> Result<(), CalibrationError> {
        let _slot = self.context.begin_calibration()?;
        let mut world = self.context.snapshot().world.clone();
        world.set_origin(point);
        self.context.publish_world(world)?;
        Ok(())
    }

    /// Fix the reconstruction scale from simultaneously observed marker
    /// pairs with a known real-world separation. Returns the applied scale
    /// factor.
    pub fn calibrate_scale(
        &self,
        observations: &[Vec<Pt3>],
        known_distance: Real,
    ) -> Result<Real, CalibrationError> {
        let _slot = self.context.begin_calibration()?;
        let mut poses = self.context.snapshot().poses.clone();
        let scale = fix_scale(&mut poses, observations, known_distance)?;
        info!("scale fixed, factor {scale:.6}");
        self.context.publish_poses(poses)?;
        Ok(scale)
    }
}

/// Run a full pose calibration on its own thread, keeping the frame loop
/// free. Concurrency control stays with the shared context: if another
/// action is in flight the thread returns [`CalibrationError::Busy`].
pub fn spawn_pose_calibration(
    runner: Arc<CalibrationRunner>,
    samples: Vec<CalibrationSample>,
) -> JoinHandle<Result<PoseCalibrationReport, CalibrationError>> {
    std::thread::spawn(move || runner.calibrate_poses(&samples))
}
