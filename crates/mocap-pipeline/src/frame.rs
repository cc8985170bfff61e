//! Per-frame processing and the fixed-rate capture loop.
//!
//! Every captured frame recomputes the outputs of all active stages from
//! scratch, in ascending stage order; lower-stage outputs feed the higher
//! stages of the same frame. Which stages are active is decided by the
//! shared capture state alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use mocap_core::{FramePoints, ObjectPoint, Pt2, Pt3, Real};

use crate::context::SharedContext;
use crate::correspondence::{find_correspondences, MatchOptions};
use crate::objects::{pair_markers, MarkerDetection, PairingOptions};
use crate::state::CaptureState;
use crate::tracker::{MarkerTracker, TrackedObject, TrackerConfig};

/// Output of one frame, shaped by the highest active stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameOutput {
    /// No capture stage is active.
    Idle,
    /// Point capture only: raw per-camera detections, camera order
    /// preserved.
    Points { points: Vec<Vec<Pt2>> },
    /// Triangulation active: world-frame object points with errors,
    /// parallel arrays.
    ObjectPoints { points: Vec<Pt3>, errors: Vec<Real> },
    /// Object detection active: everything above plus raw and filtered
    /// rigid-marker detections.
    Objects {
        points: Vec<Pt3>,
        errors: Vec<Real>,
        raw: Vec<MarkerDetection>,
        filtered: Vec<TrackedObject>,
    },
}

/// Stateful per-frame processor. Owns the tracker; everything else is read
/// from the shared context per frame.
pub struct FrameProcessor {
    context: Arc<SharedContext>,
    tracker: MarkerTracker,
    match_options: MatchOptions,
    pairing: PairingOptions,
}

impl FrameProcessor {
    pub fn new(context: Arc<SharedContext>) -> Self {
        Self::with_options(
            context,
            MatchOptions::default(),
            PairingOptions::default(),
            TrackerConfig::default(),
        )
    }

    pub fn with_options(
        context: Arc<SharedContext>,
        match_options: MatchOptions,
        pairing: PairingOptions,
        tracker: TrackerConfig,
    ) -> Self {
        Self {
            context,
            tracker: MarkerTracker::new(tracker),
            match_options,
            pairing,
        }
    }

    pub fn context(&self) -> &Arc<SharedContext> {
        &self.context
    }

    /// Run all active stages for one frame.
    pub fn process(&mut self, frame: &FramePoints) -> FrameOutput {
        let state = self.context.capture_state();
        if state < CaptureState::PointCapture {
            return FrameOutput::Idle;
        }

        // Point capture: the raw detections pass through untouched.
        if state < CaptureState::Triangulation {
            return FrameOutput::Points {
                points: frame.cameras.clone(),
            };
        }

        // Triangulation: correspondence search under the current poses,
        // then the world transform.
        let snapshot = self.context.snapshot();
        let reconstructed = find_correspondences(
            frame,
            self.context.intrinsics(),
            &snapshot.poses,
            &self.match_options,
        );
        let world_points: Vec<ObjectPoint> = reconstructed
            .iter()
            .map(|p| ObjectPoint::new(snapshot.world.apply(&p.position), p.error))
            .collect();

        let points: Vec<Pt3> = world_points.iter().map(|p| p.position).collect();
        let errors: Vec<Real> = world_points.iter().map(|p| p.error).collect();

        if state < CaptureState::ObjectDetection {
            return FrameOutput::ObjectPoints { points, errors };
        }

        // Object detection: pair markers and feed the tracker.
        let raw = pair_markers(&world_points, &self.pairing);
        let filtered = self.tracker.update(&raw);
        FrameOutput::Objects {
            points,
            errors,
            raw,
            filtered,
        }
    }
}

/// Cooperative stop flag for a running [`FrameLoop`].
#[derive(Debug, Clone)]
pub struct LoopHandle {
    running: Arc<AtomicBool>,
}

impl LoopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Fixed-rate frame loop. Stages run synchronously in order within each
/// tick; calibration actions run elsewhere and are only observed through
/// the shared context's snapshots.
pub struct FrameLoop {
    processor: FrameProcessor,
    period: Duration,
    running: Arc<AtomicBool>,
}

impl FrameLoop {
    /// `frame_rate` is the target tick rate in Hz.
    pub fn new(processor: FrameProcessor, frame_rate: Real) -> Self {
        Self {
            processor,
            period: Duration::from_secs_f64(1.0 / frame_rate.max(1.0)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            running: self.running.clone(),
        }
    }

    /// Pull frames from `source` until it runs dry or the handle stops the
    /// loop, pushing each frame's output into `sink`.
    pub fn run(
        mut self,
        mut source: impl FnMut() -> Option<FramePoints>,
        mut sink: impl FnMut(FrameOutput),
    ) {
        while self.running.load(Ordering::SeqCst) {
            let tick = Instant::now();
            let Some(frame) = source() else { break };
            sink(self.processor.process(&frame));

            let elapsed = tick.elapsed();
            if elapsed < self.period {
                std::thread::sleep(self.period - elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_core::Mat3;

    fn intrinsics() -> Mat3 {
        Mat3::new(320.0, 0.0, 160.0, 0.0, 320.0, 160.0, 0.0, 0.0, 1.0)
    }

    fn context_at(state: CaptureState) -> Arc<SharedContext> {
        let ctx = SharedContext::new(vec![intrinsics(); 2]);
        ctx.with_state(|m| {
            let ladder = [
                CaptureState::CamerasFound,
                CaptureState::ImageProcessing,
                CaptureState::PointCapture,
                CaptureState::Triangulation,
                CaptureState::ObjectDetection,
            ];
            for s in ladder {
                if s <= state {
                    m.start("climb", s).unwrap();
                }
            }
        });
        ctx
    }

    #[test]
    fn idle_below_point_capture() {
        let mut proc = FrameProcessor::new(context_at(CaptureState::ImageProcessing));
        let out = proc.process(&FramePoints::new(vec![vec![Pt2::new(1.0, 2.0)], vec![]]));
        assert!(matches!(out, FrameOutput::Idle));
    }

    #[test]
    fn point_capture_passes_raw_points_through() {
        let mut proc = FrameProcessor::new(context_at(CaptureState::PointCapture));
        let out = proc.process(&FramePoints::new(vec![vec![Pt2::new(1.0, 2.0)], vec![]]));
        match out {
            FrameOutput::Points { points } => {
                assert_eq!(points[0], vec![Pt2::new(1.0, 2.0)]);
                assert!(points[1].is_empty());
            }
            other => panic!("expected Points, got {other:?}"),
        }
    }

    #[test]
    fn empty_frame_triangulates_to_nothing() {
        let mut proc = FrameProcessor::new(context_at(CaptureState::Triangulation));
        let out = proc.process(&FramePoints::new(vec![vec![], vec![]]));
        match out {
            FrameOutput::ObjectPoints { points, errors } => {
                assert!(points.is_empty());
                assert!(errors.is_empty());
            }
            other => panic!("expected ObjectPoints, got {other:?}"),
        }
    }

    #[test]
    fn frame_loop_stops_when_source_runs_dry() {
        let proc = FrameProcessor::new(context_at(CaptureState::PointCapture));
        let frame_loop = FrameLoop::new(proc, 1000.0);
        let mut frames = vec![
            FramePoints::new(vec![vec![], vec![]]),
            FramePoints::new(vec![vec![], vec![]]),
        ];
        let mut outputs = 0usize;
        frame_loop.run(move || frames.pop(), |_| outputs += 1);
        // both frames consumed, then the dry source ended the loop
        assert_eq!(outputs, 2);
    }

    #[test]
    fn loop_handle_stops_an_endless_source() {
        let proc = FrameProcessor::new(context_at(CaptureState::PointCapture));
        let frame_loop = FrameLoop::new(proc, 2000.0);
        let handle = frame_loop.handle();
        let mut ticks = 0usize;
        frame_loop.run(
            || Some(FramePoints::new(vec![vec![], vec![]])),
            |_| {
                ticks += 1;
                if ticks >= 3 {
                    handle.stop();
                }
            },
        );
        assert!(ticks >= 3);
    }
}
